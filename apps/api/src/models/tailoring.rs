use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::tailoring::diff::DiffResult;
use crate::tailoring::mode::TailoringMode;

/// Finished tailoring output handed to the document layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TailoredResult {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub mode: TailoringMode,
    pub provider: String,
    pub text: String,
    pub diff: DiffResult,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TailoredResultRow {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub mode: String,
    pub provider: String,
    pub tailored_text: String,
    pub diff: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TailoredResultRow> for TailoredResult {
    type Error = String;

    fn try_from(row: TailoredResultRow) -> Result<Self, Self::Error> {
        let mode = row
            .mode
            .parse::<TailoringMode>()
            .map_err(|e| format!("unknown mode '{}'", e.0))?;
        let diff = serde_json::from_value(row.diff).map_err(|e| e.to_string())?;
        Ok(TailoredResult {
            resume_id: row.resume_id,
            user_id: row.user_id,
            mode,
            provider: row.provider,
            text: row.tailored_text,
            diff,
            created_at: row.created_at,
        })
    }
}
