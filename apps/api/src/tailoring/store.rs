//! Persistence seam for the tailoring core.
//!
//! The core only needs atomic upsert/read for progress, an atomic
//! read-check-increment for usage, and a place to drop finished results.
//! Postgres adapters live in `pg_store`; the in-memory adapters here back
//! single-node deployments and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::progress::{ProgressRecord, ProgressUpdate};
use crate::models::tailoring::TailoredResult;
use crate::models::usage::{LimitsTable, QuotaDecision, Tier, UsageCounters};
use crate::tailoring::mode::TailoringMode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Key of a progress record: `(resume_id, user_id)`.
pub type ProgressKey = (Uuid, Uuid);

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Insert-or-update in one atomic step. Returns `false` when the stored
    /// record refused the write (see `ProgressRecord::accepts`). A record
    /// untouched for longer than `stale_after` counts as abandoned.
    async fn upsert(
        &self,
        update: &ProgressUpdate,
        max_attempts: u32,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn get(&self, resume_id: Uuid, user_id: Uuid)
        -> Result<Option<ProgressRecord>, StoreError>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Atomically rolls the day over, checks the limit and increments.
    async fn consume(
        &self,
        user_id: Uuid,
        mode: TailoringMode,
        limits: &LimitsTable,
        today: NaiveDate,
    ) -> Result<QuotaDecision, StoreError>;

    /// Today's counters, rolled over if the stored day is stale. Unknown
    /// users read as a fresh free-tier row.
    async fn counters(&self, user_id: Uuid, today: NaiveDate)
        -> Result<UsageCounters, StoreError>;

    async fn set_tier(&self, user_id: Uuid, tier: Tier, today: NaiveDate)
        -> Result<(), StoreError>;
}

#[async_trait]
pub trait TailoredResultStore: Send + Sync {
    async fn save(&self, result: &TailoredResult) -> Result<(), StoreError>;

    async fn get(&self, resume_id: Uuid, user_id: Uuid)
        -> Result<Option<TailoredResult>, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory adapters
// ────────────────────────────────────────────────────────────────────────────

/// Progress records as shared snapshots. Writers swap in a new `Arc` under a
/// short write lock; readers clone the `Arc` and never wait on a provider call.
#[derive(Default)]
pub struct MemoryProgressStore {
    records: RwLock<HashMap<ProgressKey, Arc<ProgressRecord>>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn upsert(
        &self,
        update: &ProgressUpdate,
        max_attempts: u32,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        let key = (update.resume_id, update.user_id);
        let current = records.get(&key).map(Arc::as_ref);
        match ProgressRecord::apply(current, update, max_attempts, stale_after, now) {
            Some(next) => {
                records.insert(key, Arc::new(next));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let snapshot = {
            let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
            records.get(&(resume_id, user_id)).cloned()
        };
        Ok(snapshot.map(|record| record.as_ref().clone()))
    }
}

/// Usage counters with one mutex per user. The outer map lock is held only
/// long enough to find or create that user's mutex.
#[derive(Default)]
pub struct MemoryUsageStore {
    users: RwLock<HashMap<Uuid, Arc<Mutex<UsageCounters>>>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<Arc<Mutex<UsageCounters>>, StoreError> {
        if let Some(existing) = self
            .users
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&user_id)
        {
            return Ok(existing.clone());
        }
        let mut users = self.users.write().map_err(|_| StoreError::Poisoned)?;
        Ok(users
            .entry(user_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(UsageCounters::new(user_id, Tier::Free, today)))
            })
            .clone())
    }
}

#[async_trait]
impl UsageStore for MemoryUsageStore {
    async fn consume(
        &self,
        user_id: Uuid,
        mode: TailoringMode,
        limits: &LimitsTable,
        today: NaiveDate,
    ) -> Result<QuotaDecision, StoreError> {
        let entry = self.entry(user_id, today)?;
        let mut counters = entry.lock().await;
        Ok(counters.apply_consume(mode, limits, today))
    }

    async fn counters(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<UsageCounters, StoreError> {
        let entry = self.entry(user_id, today)?;
        let mut counters = entry.lock().await;
        counters.roll_over(today);
        Ok(counters.clone())
    }

    async fn set_tier(
        &self,
        user_id: Uuid,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        let entry = self.entry(user_id, today)?;
        entry.lock().await.tier = tier;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryResultStore {
    results: RwLock<HashMap<ProgressKey, TailoredResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TailoredResultStore for MemoryResultStore {
    async fn save(&self, result: &TailoredResult) -> Result<(), StoreError> {
        self.results
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .insert((result.resume_id, result.user_id), result.clone());
        Ok(())
    }

    async fn get(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TailoredResult>, StoreError> {
        Ok(self
            .results
            .read()
            .map_err(|_| StoreError::Poisoned)?
            .get(&(resume_id, user_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::progress::ProgressStatus;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
    }

    #[tokio::test]
    async fn test_progress_upsert_never_duplicates() {
        let store = MemoryProgressStore::new();
        let resume_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        for (status, progress) in [
            (ProgressStatus::Pending, 0),
            (ProgressStatus::Generating, 10),
            (ProgressStatus::Completed, 100),
        ] {
            let update = ProgressUpdate {
                resume_id,
                user_id,
                status,
                progress,
                attempt: None,
                error: None,
            };
            assert!(store
                .upsert(&update, 3, Duration::minutes(10), Utc::now())
                .await
                .unwrap());
        }
        assert_eq!(store.records.read().unwrap().len(), 1);
        let record = store.get(resume_id, user_id).await.unwrap().unwrap();
        assert_eq!(record.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn test_second_pending_is_refused_until_first_job_finishes() {
        let store = MemoryProgressStore::new();
        let (resume_id, user_id) = (Uuid::new_v4(), Uuid::new_v4());
        let write = |status| ProgressUpdate {
            resume_id,
            user_id,
            status,
            progress: 0,
            attempt: Some(0),
            error: None,
        };
        let stale_after = Duration::minutes(10);
        let now = Utc::now();

        assert!(store
            .upsert(&write(ProgressStatus::Pending), 3, stale_after, now)
            .await
            .unwrap());
        assert!(!store
            .upsert(&write(ProgressStatus::Pending), 3, stale_after, now)
            .await
            .unwrap());
        assert!(store
            .upsert(&write(ProgressStatus::Completed), 3, stale_after, now)
            .await
            .unwrap());
        assert!(store
            .upsert(&write(ProgressStatus::Pending), 3, stale_after, now)
            .await
            .unwrap());

        let later = now + Duration::minutes(11);
        assert!(store
            .upsert(&write(ProgressStatus::Pending), 3, stale_after, later)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_progress_get_missing_is_none() {
        let store = MemoryProgressStore::new();
        assert!(store
            .get(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consumes_never_exceed_limit() {
        let store = Arc::new(MemoryUsageStore::new());
        let limits = LimitsTable::default().with_limit(Tier::Free, TailoringMode::Basic, Some(7));
        let user_id = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let limits = limits.clone();
            handles.push(tokio::spawn(async move {
                store
                    .consume(user_id, TailoringMode::Basic, &limits, today())
                    .await
                    .unwrap()
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 7);
        let counters = store.counters(user_id, today()).await.unwrap();
        assert_eq!(counters.count(TailoringMode::Basic), 7);
    }

    #[tokio::test]
    async fn test_set_tier_lifts_free_limits() {
        let store = MemoryUsageStore::new();
        let limits =
            LimitsTable::default().with_limit(Tier::Free, TailoringMode::Linkedin, Some(1));
        let user_id = Uuid::new_v4();

        assert!(store
            .consume(user_id, TailoringMode::Linkedin, &limits, today())
            .await
            .unwrap()
            .is_allowed());
        assert!(!store
            .consume(user_id, TailoringMode::Linkedin, &limits, today())
            .await
            .unwrap()
            .is_allowed());

        store.set_tier(user_id, Tier::Premium, today()).await.unwrap();
        assert_eq!(
            store
                .consume(user_id, TailoringMode::Linkedin, &limits, today())
                .await
                .unwrap(),
            QuotaDecision::Allow {
                used: 2,
                limit: None
            }
        );
    }

    #[tokio::test]
    async fn test_counters_for_unknown_user_are_zero() {
        let store = MemoryUsageStore::new();
        let counters = store.counters(Uuid::new_v4(), today()).await.unwrap();
        assert_eq!(counters.tier, Tier::Free);
        assert_eq!(counters.counts, [0; 6]);
    }
}
