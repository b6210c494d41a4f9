//! Progress tracking for polling clients.
//!
//! Every write is an idempotent upsert keyed by `(resume_id, user_id)`.
//! A missing record is created, an in-flight one is updated, and a terminal
//! or abandoned one is only replaced by the `pending` write of the next job.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::progress::{ProgressStatus, ProgressUpdate, ProgressView};
use crate::tailoring::store::{ProgressStore, StoreError};

#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    max_attempts: u32,
    stale_after: Duration,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>, max_attempts: u32, stale_after: Duration) -> Self {
        Self {
            store,
            max_attempts,
            stale_after,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Claims the record for a new job with a `pending` write.
    ///
    /// Returns `false` when another job for the same key is still in flight
    /// and has written within the staleness window. Nothing is written then.
    pub async fn begin(&self, resume_id: Uuid, user_id: Uuid) -> Result<bool, StoreError> {
        self.write(ProgressUpdate {
            resume_id,
            user_id,
            status: ProgressStatus::Pending,
            progress: 0,
            attempt: Some(0),
            error: None,
        })
        .await
    }

    /// Moves the record to `status`. `attempt = None` keeps the stored count.
    pub async fn transition(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
        status: ProgressStatus,
        progress: u8,
        attempt: Option<u32>,
    ) -> Result<(), StoreError> {
        self.write(ProgressUpdate {
            resume_id,
            user_id,
            status,
            progress,
            attempt,
            error: None,
        })
        .await
        .map(|_| ())
    }

    /// Terminal failure with a reason code for the poller.
    pub async fn fail(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
        progress: u8,
        attempt: Option<u32>,
        reason: &str,
    ) -> Result<(), StoreError> {
        self.write(ProgressUpdate {
            resume_id,
            user_id,
            status: ProgressStatus::Failed,
            progress,
            attempt,
            error: Some(reason.to_string()),
        })
        .await
        .map(|_| ())
    }

    async fn write(&self, update: ProgressUpdate) -> Result<bool, StoreError> {
        let applied = self
            .store
            .upsert(&update, self.max_attempts, self.stale_after, Utc::now())
            .await?;
        if applied {
            debug!(
                "Progress {}/{}: {} {}% attempt {:?}",
                update.resume_id, update.user_id, update.status, update.progress, update.attempt
            );
        } else {
            warn!(
                "Refused {} write for {}/{}: record belongs to another job state",
                update.status, update.resume_id, update.user_id
            );
        }
        Ok(applied)
    }

    /// Latest snapshot, with stale in-flight records reported as failed.
    pub async fn get(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProgressView>, StoreError> {
        let record = self.store.get(resume_id, user_id).await?;
        Ok(record.map(|r| ProgressView::new(r, Utc::now(), self.stale_after)))
    }
}
