//! Postgres adapters for the tailoring stores.
//!
//! Atomicity is per row: progress writes are a single conditional upsert,
//! usage consumption locks the user's row for the read-check-increment.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::models::progress::{ProgressRecord, ProgressRecordRow, ProgressUpdate};
use crate::models::tailoring::{TailoredResult, TailoredResultRow};
use crate::models::usage::{LimitsTable, QuotaDecision, Tier, UsageCounters, UsageCountersRow};
use crate::tailoring::mode::TailoringMode;
use crate::tailoring::store::{ProgressStore, StoreError, TailoredResultStore, UsageStore};

const USAGE_COLUMNS: &str = "user_id, tier, basic_count, personalized_count, aggressive_count, \
    cover_letter_count, linkedin_count, interview_count, reset_date";

pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn upsert(
        &self,
        update: &ProgressUpdate,
        max_attempts: u32,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Same rule as ProgressRecord::accepts: `pending` needs a terminal or
        // abandoned row, everything else needs a row still in flight.
        let result = sqlx::query(
            r#"
            INSERT INTO progress_records
                (resume_id, user_id, status, progress, current_attempt, max_attempts, error, updated_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, 0), $6, $7, $8)
            ON CONFLICT (resume_id, user_id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                current_attempt = CASE
                    WHEN EXCLUDED.status = 'pending' THEN COALESCE($5, 0)
                    ELSE COALESCE($5, progress_records.current_attempt)
                END,
                max_attempts = EXCLUDED.max_attempts,
                error = EXCLUDED.error,
                updated_at = EXCLUDED.updated_at
            WHERE CASE
                WHEN EXCLUDED.status = 'pending' THEN
                    progress_records.status IN ('completed', 'failed')
                    OR progress_records.updated_at < $9
                ELSE progress_records.status NOT IN ('completed', 'failed')
            END
            "#,
        )
        .bind(update.resume_id)
        .bind(update.user_id)
        .bind(update.status.as_str())
        .bind(update.progress.min(100) as i16)
        .bind(update.attempt.map(|a| a as i32))
        .bind(max_attempts as i32)
        .bind(update.error.as_deref())
        .bind(now)
        .bind(now - stale_after)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        let row = sqlx::query_as::<_, ProgressRecordRow>(
            "SELECT * FROM progress_records WHERE resume_id = $1 AND user_id = $2",
        )
        .bind(resume_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProgressRecord::try_from)
            .transpose()
            .map_err(StoreError::Corrupt)
    }
}

pub struct PgUsageStore {
    pool: PgPool,
}

impl PgUsageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Inserts a fresh free-tier row if the user has none, then locks it.
async fn lock_counters(
    conn: &mut PgConnection,
    user_id: Uuid,
    today: NaiveDate,
) -> Result<UsageCounters, StoreError> {
    sqlx::query(
        "INSERT INTO usage_counters (user_id, tier, reset_date) VALUES ($1, 'free', $2) \
         ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(today)
    .execute(&mut *conn)
    .await?;

    let row = sqlx::query_as::<_, UsageCountersRow>(&format!(
        "SELECT {USAGE_COLUMNS} FROM usage_counters WHERE user_id = $1 FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(UsageCounters::from(row))
}

async fn write_counters(
    conn: &mut PgConnection,
    counters: &UsageCounters,
) -> Result<(), StoreError> {
    let mut query = String::from("UPDATE usage_counters SET tier = $2, reset_date = $3");
    for (i, mode) in TailoringMode::ALL.iter().enumerate() {
        query.push_str(&format!(", {} = ${}", mode.counter_column(), i + 4));
    }
    query.push_str(" WHERE user_id = $1");

    let mut q = sqlx::query(&query)
        .bind(counters.user_id)
        .bind(counters.tier.as_str())
        .bind(counters.reset_date);
    for mode in TailoringMode::ALL {
        q = q.bind(counters.count(mode) as i32);
    }
    q.execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl UsageStore for PgUsageStore {
    async fn consume(
        &self,
        user_id: Uuid,
        mode: TailoringMode,
        limits: &LimitsTable,
        today: NaiveDate,
    ) -> Result<QuotaDecision, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut counters = lock_counters(&mut tx, user_id, today).await?;
        let decision = counters.apply_consume(mode, limits, today);
        write_counters(&mut tx, &counters).await?;
        tx.commit().await?;

        debug!("Usage for user {user_id} mode {mode}: {decision:?}");
        Ok(decision)
    }

    async fn counters(
        &self,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<UsageCounters, StoreError> {
        let row = sqlx::query_as::<_, UsageCountersRow>(&format!(
            "SELECT {USAGE_COLUMNS} FROM usage_counters WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let mut counters = match row {
            Some(row) => UsageCounters::from(row),
            None => UsageCounters::new(user_id, Tier::Free, today),
        };
        counters.roll_over(today);
        Ok(counters)
    }

    async fn set_tier(
        &self,
        user_id: Uuid,
        tier: Tier,
        today: NaiveDate,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut counters = lock_counters(&mut tx, user_id, today).await?;
        counters.tier = tier;
        write_counters(&mut tx, &counters).await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TailoredResultStore for PgResultStore {
    async fn save(&self, result: &TailoredResult) -> Result<(), StoreError> {
        let diff = serde_json::to_value(&result.diff)?;
        sqlx::query(
            r#"
            INSERT INTO tailored_results
                (resume_id, user_id, mode, provider, tailored_text, diff, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (resume_id, user_id) DO UPDATE SET
                mode = EXCLUDED.mode,
                provider = EXCLUDED.provider,
                tailored_text = EXCLUDED.tailored_text,
                diff = EXCLUDED.diff,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(result.resume_id)
        .bind(result.user_id)
        .bind(result.mode.as_str())
        .bind(&result.provider)
        .bind(&result.text)
        .bind(&diff)
        .bind(result.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TailoredResult>, StoreError> {
        let row = sqlx::query_as::<_, TailoredResultRow>(
            "SELECT * FROM tailored_results WHERE resume_id = $1 AND user_id = $2",
        )
        .bind(resume_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TailoredResult::try_from)
            .transpose()
            .map_err(StoreError::Corrupt)
    }
}
