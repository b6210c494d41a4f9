use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Attempts per provider before the job falls through to the next one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Lifecycle of a tailoring job as seen by polling clients.
///
/// `pending → generating → (retrying ⇄ generating) → completed | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    Generating,
    Retrying,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Pending => "pending",
            ProgressStatus::Generating => "generating",
            ProgressStatus::Retrying => "retrying",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Completed | ProgressStatus::Failed)
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProgressStatus::Pending),
            "generating" => Ok(ProgressStatus::Generating),
            "retrying" => Ok(ProgressStatus::Retrying),
            "completed" => Ok(ProgressStatus::Completed),
            "failed" => Ok(ProgressStatus::Failed),
            other => Err(format!("unknown progress status '{other}'")),
        }
    }
}

/// Durable state of the latest job for one `(resume_id, user_id)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub status: ProgressStatus,
    /// 0 – 100
    pub progress: u8,
    pub current_attempt: u32,
    pub max_attempts: u32,
    /// Failure reason for `failed` records, e.g. `QuotaExceeded`.
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One requested write against a progress record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub status: ProgressStatus,
    pub progress: u8,
    /// `None` keeps the stored attempt count.
    pub attempt: Option<u32>,
    pub error: Option<String>,
}

impl ProgressRecord {
    /// Whether this record may be overwritten with `next`.
    ///
    /// `pending` starts a new job, so it only replaces a finished record or
    /// one whose job died mid-flight. Every other status belongs to the job
    /// in flight and is refused once that job has finished.
    pub fn accepts(
        &self,
        next: ProgressStatus,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> bool {
        match next {
            ProgressStatus::Pending => {
                self.status.is_terminal() || self.is_stale(now, stale_after)
            }
            _ => !self.status.is_terminal(),
        }
    }

    /// Computes the record that results from applying `update` on top of `current`.
    ///
    /// Returns `None` when the current record refuses the update; the stored
    /// record must then stay untouched.
    pub fn apply(
        current: Option<&ProgressRecord>,
        update: &ProgressUpdate,
        max_attempts: u32,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Option<ProgressRecord> {
        if let Some(existing) = current {
            if !existing.accepts(update.status, now, stale_after) {
                return None;
            }
        }

        let starting_over = update.status == ProgressStatus::Pending;
        let previous_attempt = match current {
            Some(existing) if !starting_over => existing.current_attempt,
            _ => 0,
        };

        Some(ProgressRecord {
            resume_id: update.resume_id,
            user_id: update.user_id,
            status: update.status,
            progress: update.progress.min(100),
            current_attempt: update.attempt.unwrap_or(previous_attempt),
            max_attempts,
            error: update.error.clone(),
            updated_at: now,
        })
    }

    /// A non-terminal record that has not been written for longer than
    /// `threshold` belongs to a job that died mid-flight.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        !self.status.is_terminal() && now - self.updated_at > threshold
    }
}

/// What a polling client sees: the stored record plus its interpreted status.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    #[serde(flatten)]
    pub record: ProgressRecord,
    /// `failed` for stale in-flight records, otherwise the stored status.
    pub effective_status: ProgressStatus,
    pub stale: bool,
}

impl ProgressView {
    pub fn new(record: ProgressRecord, now: DateTime<Utc>, stale_after: Duration) -> Self {
        let stale = record.is_stale(now, stale_after);
        let effective_status = if stale {
            ProgressStatus::Failed
        } else {
            record.status
        };
        Self {
            record,
            effective_status,
            stale,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProgressRecordRow {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub status: String,
    pub progress: i16,
    pub current_attempt: i32,
    pub max_attempts: i32,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ProgressRecordRow> for ProgressRecord {
    type Error = String;

    fn try_from(row: ProgressRecordRow) -> Result<Self, Self::Error> {
        Ok(ProgressRecord {
            resume_id: row.resume_id,
            user_id: row.user_id,
            status: row.status.parse()?,
            progress: row.progress.clamp(0, 100) as u8,
            current_attempt: row.current_attempt.max(0) as u32,
            max_attempts: row.max_attempts.max(0) as u32,
            error: row.error,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stale() -> Duration {
        Duration::minutes(10)
    }

    fn update(status: ProgressStatus, progress: u8, attempt: Option<u32>) -> ProgressUpdate {
        ProgressUpdate {
            resume_id: Uuid::nil(),
            user_id: Uuid::nil(),
            status,
            progress,
            attempt,
            error: None,
        }
    }

    #[test]
    fn test_apply_on_missing_record_creates_it() {
        let now = Utc::now();
        let record =
            ProgressRecord::apply(None, &update(ProgressStatus::Generating, 10, None), 3, stale(), now)
                .unwrap();
        assert_eq!(record.status, ProgressStatus::Generating);
        assert_eq!(record.current_attempt, 0);
        assert_eq!(record.max_attempts, 3);
        assert_eq!(record.updated_at, now);
    }

    #[test]
    fn test_apply_keeps_attempt_when_not_given() {
        let now = Utc::now();
        let retrying =
            ProgressRecord::apply(None, &update(ProgressStatus::Retrying, 25, Some(2)), 3, stale(), now)
                .unwrap();
        let completed = ProgressRecord::apply(
            Some(&retrying),
            &update(ProgressStatus::Completed, 100, None),
            3,
            stale(),
            now,
        )
        .unwrap();
        assert_eq!(completed.current_attempt, 2);
        assert_eq!(completed.progress, 100);
    }

    #[test]
    fn test_terminal_record_refuses_in_flight_writes() {
        let now = Utc::now();
        let done =
            ProgressRecord::apply(None, &update(ProgressStatus::Completed, 100, None), 3, stale(), now)
                .unwrap();
        assert!(ProgressRecord::apply(
            Some(&done),
            &update(ProgressStatus::Generating, 10, None),
            3,
            stale(),
            now
        )
        .is_none());
        assert!(ProgressRecord::apply(
            Some(&done),
            &update(ProgressStatus::Failed, 10, None),
            3,
            stale(),
            now
        )
        .is_none());
    }

    #[test]
    fn test_pending_supersedes_terminal_and_resets_attempts() {
        let now = Utc::now();
        let failed =
            ProgressRecord::apply(None, &update(ProgressStatus::Failed, 75, Some(3)), 3, stale(), now)
                .unwrap();
        let next = ProgressRecord::apply(
            Some(&failed),
            &update(ProgressStatus::Pending, 0, None),
            3,
            stale(),
            now,
        )
        .unwrap();
        assert_eq!(next.status, ProgressStatus::Pending);
        assert_eq!(next.current_attempt, 0);
        assert!(next.error.is_none());
    }

    #[test]
    fn test_pending_is_refused_while_a_live_job_is_in_flight() {
        let now = Utc::now();
        let running =
            ProgressRecord::apply(None, &update(ProgressStatus::Retrying, 25, Some(1)), 3, stale(), now)
                .unwrap();
        assert!(ProgressRecord::apply(
            Some(&running),
            &update(ProgressStatus::Pending, 0, Some(0)),
            3,
            stale(),
            now
        )
        .is_none());

        let pending =
            ProgressRecord::apply(None, &update(ProgressStatus::Pending, 0, Some(0)), 3, stale(), now)
                .unwrap();
        assert!(ProgressRecord::apply(
            Some(&pending),
            &update(ProgressStatus::Pending, 0, Some(0)),
            3,
            stale(),
            now
        )
        .is_none());
    }

    #[test]
    fn test_pending_replaces_a_stale_in_flight_record() {
        let now = Utc::now();
        let mut running =
            ProgressRecord::apply(None, &update(ProgressStatus::Generating, 10, Some(0)), 3, stale(), now)
                .unwrap();
        running.updated_at = now - Duration::minutes(30);

        let next = ProgressRecord::apply(
            Some(&running),
            &update(ProgressStatus::Pending, 0, Some(0)),
            3,
            stale(),
            now,
        )
        .unwrap();
        assert_eq!(next.status, ProgressStatus::Pending);
        assert_eq!(next.updated_at, now);
    }

    #[test]
    fn test_progress_is_clamped_to_100() {
        let record = ProgressRecord::apply(
            None,
            &update(ProgressStatus::Generating, 250, None),
            3,
            stale(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.progress, 100);
    }

    #[test]
    fn test_stale_in_flight_record_reads_as_failed() {
        let now = Utc::now();
        let mut record =
            ProgressRecord::apply(None, &update(ProgressStatus::Generating, 50, None), 3, stale(), now)
                .unwrap();
        record.updated_at = now - Duration::minutes(30);

        let view = ProgressView::new(record, now, Duration::minutes(10));
        assert!(view.stale);
        assert_eq!(view.effective_status, ProgressStatus::Failed);
        assert_eq!(view.record.status, ProgressStatus::Generating);
    }

    #[test]
    fn test_old_terminal_record_is_never_stale() {
        let now = Utc::now();
        let mut record =
            ProgressRecord::apply(None, &update(ProgressStatus::Completed, 100, None), 3, stale(), now)
                .unwrap();
        record.updated_at = now - Duration::days(2);
        assert!(!record.is_stale(now, Duration::minutes(10)));
    }

    #[test]
    fn test_row_with_unknown_status_fails_conversion() {
        let row = ProgressRecordRow {
            resume_id: Uuid::nil(),
            user_id: Uuid::nil(),
            status: "exploded".to_string(),
            progress: 10,
            current_attempt: 0,
            max_attempts: 3,
            error: None,
            updated_at: Utc::now(),
        };
        assert!(ProgressRecord::try_from(row).is_err());
    }
}
