//! Tailoring orchestration — turns a request into a tracked, quota-limited,
//! retried and failed-over unit of work.
//!
//! Flow: validate → claim the record with `pending` → quota → generating →
//!       per-provider retry loop inside the provider fallback loop → diff →
//!       persist → completed.
//!
//! Progress writes are best-effort: a failing progress store is logged and
//! never changes the outcome of the job.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::llm_client::{GenerateParams, ProviderError, TextGenerator};
use crate::models::progress::{ProgressStatus, ProgressView};
use crate::models::tailoring::TailoredResult;
use crate::models::usage::QuotaDecision;
use crate::tailoring::backoff::{retry_with_backoff, BackoffPolicy};
use crate::tailoring::diff::{align_trailing_newline, compute_diff, DiffResult};
use crate::tailoring::mode::TailoringMode;
use crate::tailoring::progress::ProgressTracker;
use crate::tailoring::prompts::{build_system_prompt, build_tailoring_prompt, temperature_for};
use crate::tailoring::quota::QuotaLedger;
use crate::tailoring::store::{StoreError, TailoredResultStore};

/// Progress reported once the first provider call is in flight.
const GENERATING_PROGRESS: u8 = 10;
/// Progress reported for retry 1, 2, 3+.
const RETRY_MILESTONES: [u8; 3] = [25, 50, 75];

/// Upper bounds on request text. The diff's LCS table grows with the line
/// count of `original_text` times that of the tailored output.
pub const MAX_ORIGINAL_TEXT_BYTES: usize = 64 * 1024;
pub const MAX_ORIGINAL_TEXT_LINES: usize = 2_000;
pub const MAX_JOB_DESCRIPTION_BYTES: usize = 32 * 1024;

pub const REASON_QUOTA_EXCEEDED: &str = "QuotaExceeded";
pub const REASON_PROVIDER_UNAVAILABLE: &str = "ProviderUnavailable";
pub const REASON_INTERNAL: &str = "InternalError";

fn retry_milestone(attempt: u32) -> u8 {
    let index = (attempt.max(1) as usize - 1).min(RETRY_MILESTONES.len() - 1);
    RETRY_MILESTONES[index]
}

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Raw request as received from the web layer.
#[derive(Debug, Clone, Deserialize)]
pub struct TailoringRequest {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub mode: String,
    pub original_text: String,
    pub job_description: String,
}

/// A validated tailoring job. Immutable once built.
#[derive(Debug, Clone)]
pub struct TailoringJob {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub mode: TailoringMode,
    pub original_text: String,
    pub job_description: String,
}

impl TryFrom<TailoringRequest> for TailoringJob {
    type Error = TailoringError;

    fn try_from(request: TailoringRequest) -> Result<Self, Self::Error> {
        let mode = request
            .mode
            .parse::<TailoringMode>()
            .map_err(|e| TailoringError::InvalidMode(e.0))?;

        if request.original_text.trim().is_empty() {
            return Err(TailoringError::Validation(
                "original_text cannot be empty".to_string(),
            ));
        }
        if request.job_description.trim().is_empty() {
            return Err(TailoringError::Validation(
                "job_description cannot be empty".to_string(),
            ));
        }
        if request.original_text.len() > MAX_ORIGINAL_TEXT_BYTES
            || request.original_text.lines().count() > MAX_ORIGINAL_TEXT_LINES
        {
            return Err(TailoringError::Validation(format!(
                "original_text is limited to {} KiB and {MAX_ORIGINAL_TEXT_LINES} lines",
                MAX_ORIGINAL_TEXT_BYTES / 1024
            )));
        }
        if request.job_description.len() > MAX_JOB_DESCRIPTION_BYTES {
            return Err(TailoringError::Validation(format!(
                "job_description is limited to {} KiB",
                MAX_JOB_DESCRIPTION_BYTES / 1024
            )));
        }
        Ok(TailoringJob {
            resume_id: request.resume_id,
            user_id: request.user_id,
            mode,
            original_text: request.original_text,
            job_description: request.job_description,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobAccepted {
    pub resume_id: Uuid,
    pub user_id: Uuid,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TailoringOutcome {
    pub text: String,
    pub diff: DiffResult,
    pub provider: String,
}

#[derive(Debug, Error)]
pub enum TailoringError {
    #[error("Unknown tailoring mode '{0}'")]
    InvalidMode(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("A tailoring job for resume {resume_id} is already running")]
    JobInFlight { resume_id: Uuid },

    #[error("Daily limit of {limit} reached for mode {mode}")]
    QuotaExceeded { mode: TailoringMode, limit: u32 },

    #[error("All providers failed; last error from {provider}: {source}")]
    ProviderUnavailable {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One configured backend with its own retry budget.
#[derive(Clone)]
pub struct ProviderEntry {
    pub generator: Arc<dyn TextGenerator>,
    pub policy: BackoffPolicy,
}

/// Result of a `test_connection` probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderProbe {
    pub provider: String,
    pub model: String,
    pub sample: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct TailoringOrchestrator {
    /// Priority order: index 0 is tried first.
    providers: Arc<[ProviderEntry]>,
    quota: QuotaLedger,
    tracker: ProgressTracker,
    results: Arc<dyn TailoredResultStore>,
}

impl TailoringOrchestrator {
    pub fn new(
        providers: Vec<ProviderEntry>,
        quota: QuotaLedger,
        tracker: ProgressTracker,
        results: Arc<dyn TailoredResultStore>,
    ) -> Self {
        Self {
            providers: providers.into(),
            quota,
            tracker,
            results,
        }
    }

    pub fn quota(&self) -> &QuotaLedger {
        &self.quota
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.generator.name()).collect()
    }

    /// Admits the job and runs generation in the background.
    ///
    /// Returns once the quota has been consumed. The spawned task owns the
    /// job, so a caller that goes away does not cancel it.
    pub async fn start(
        &self,
        request: TailoringRequest,
    ) -> Result<JobAccepted, TailoringError> {
        let job = self.admit(request).await?;
        let accepted = JobAccepted {
            resume_id: job.resume_id,
            user_id: job.user_id,
            status: ProgressStatus::Pending,
        };

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.execute(&job).await {
                warn!(
                    "Tailoring job {}/{} ended with error: {e}",
                    job.resume_id, job.user_id
                );
            }
        });

        Ok(accepted)
    }

    /// Runs the whole protocol inline and returns the tailored text and diff.
    pub async fn run(
        &self,
        request: TailoringRequest,
    ) -> Result<TailoringOutcome, TailoringError> {
        let job = self.admit(request).await?;
        self.execute(&job).await
    }

    pub async fn progress(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProgressView>, StoreError> {
        self.tracker.get(resume_id, user_id).await
    }

    pub async fn result(
        &self,
        resume_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TailoredResult>, StoreError> {
        self.results.get(resume_id, user_id).await
    }

    /// Liveness probe against one configured provider, outside any job.
    pub async fn test_connection(&self, provider: &str) -> Result<ProviderProbe, ProviderError> {
        let entry = self
            .providers
            .iter()
            .find(|p| p.generator.name() == provider)
            .ok_or_else(|| ProviderError::NotConfigured(provider.to_string()))?;
        let sample = entry.generator.test_connection().await?;
        info!("Provider {provider} answered test connection");
        Ok(ProviderProbe {
            provider: provider.to_string(),
            model: entry.generator.model().to_string(),
            sample,
        })
    }

    /// Validates the request, claims the progress record and consumes quota.
    ///
    /// A job still running for the same key keeps its record: the request
    /// is refused before quota is touched.
    async fn admit(&self, request: TailoringRequest) -> Result<TailoringJob, TailoringError> {
        let job = TailoringJob::try_from(request)?;

        match self.tracker.begin(job.resume_id, job.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    "Refusing tailoring for {}/{}: a job is already in flight",
                    job.resume_id, job.user_id
                );
                return Err(TailoringError::JobInFlight {
                    resume_id: job.resume_id,
                });
            }
            Err(e) => error!(
                "Progress write (pending) failed for {}/{}: {e}",
                job.resume_id, job.user_id
            ),
        }

        match self.quota.consume(job.user_id, job.mode).await {
            Ok(QuotaDecision::Allow { .. }) => Ok(job),
            Ok(QuotaDecision::Deny { limit, .. }) => {
                self.record_failure(&job, 0, None, REASON_QUOTA_EXCEEDED)
                    .await;
                Err(TailoringError::QuotaExceeded {
                    mode: job.mode,
                    limit,
                })
            }
            Err(e) => {
                error!("Quota check failed for user {}: {e}", job.user_id);
                self.record_failure(&job, 0, None, REASON_INTERNAL).await;
                Err(e.into())
            }
        }
    }

    /// Tries each provider in priority order under its retry budget, then
    /// diffs and stores the first success.
    async fn execute(&self, job: &TailoringJob) -> Result<TailoringOutcome, TailoringError> {
        self.record(job, ProgressStatus::Generating, GENERATING_PROGRESS, Some(0))
            .await;

        let system_prompt = build_system_prompt();
        let prompt = build_tailoring_prompt(job.mode, &job.original_text, &job.job_description);
        let params = GenerateParams {
            prompt: &prompt,
            system_prompt: &system_prompt,
            model: None,
            temperature: temperature_for(job.mode),
        };
        let params = &params;

        let mut last_progress = GENERATING_PROGRESS;
        let mut last_error: Option<(String, ProviderError)> = None;

        for (index, entry) in self.providers.iter().enumerate() {
            let provider = entry.generator.name();
            if index > 0 {
                info!(
                    "Falling back to provider {provider} for {}/{}",
                    job.resume_id, job.user_id
                );
                self.record(job, ProgressStatus::Generating, last_progress, Some(0))
                    .await;
            }

            let mut calls = 0u32;
            let result = retry_with_backoff(
                entry.policy,
                || {
                    let attempt = calls;
                    calls += 1;
                    async move {
                        if attempt > 0 {
                            self.record(
                                job,
                                ProgressStatus::Generating,
                                retry_milestone(attempt),
                                Some(attempt),
                            )
                            .await;
                        }
                        entry.generator.generate(params).await
                    }
                },
                |err, attempts_left| {
                    let attempt = entry.policy.retries - attempts_left + 1;
                    warn!(
                        "Provider {provider} failed for {}/{} (attempt {attempt}): {err}",
                        job.resume_id, job.user_id
                    );
                    async move {
                        self.record(
                            job,
                            ProgressStatus::Retrying,
                            retry_milestone(attempt),
                            Some(attempt),
                        )
                        .await;
                    }
                },
            )
            .await;

            if entry.policy.retries > 0 {
                last_progress = last_progress.max(retry_milestone(entry.policy.retries));
            }

            match result {
                Ok(text) => return Ok(self.complete(job, provider, text).await),
                Err(e) => {
                    warn!(
                        "Provider {provider} exhausted its retry budget for {}/{}: {e}",
                        job.resume_id, job.user_id
                    );
                    last_error = Some((provider.to_string(), e));
                }
            }
        }

        self.record_failure(
            job,
            last_progress,
            Some(self.tracker.max_attempts()),
            REASON_PROVIDER_UNAVAILABLE,
        )
        .await;

        let (provider, source) = last_error.unwrap_or_else(|| {
            (
                "none".to_string(),
                ProviderError::NotConfigured("none".to_string()),
            )
        });
        error!(
            "Tailoring {}/{} failed: all providers exhausted",
            job.resume_id, job.user_id
        );
        Err(TailoringError::ProviderUnavailable { provider, source })
    }

    async fn complete(
        &self,
        job: &TailoringJob,
        provider: &str,
        text: String,
    ) -> TailoringOutcome {
        let text = align_trailing_newline(&job.original_text, text);
        let diff = compute_diff(&job.original_text, &text);
        if diff.is_identical() {
            warn!(
                "Provider {provider} returned the original text unchanged for {}/{}",
                job.resume_id, job.user_id
            );
        }

        let stored = TailoredResult {
            resume_id: job.resume_id,
            user_id: job.user_id,
            mode: job.mode,
            provider: provider.to_string(),
            text: text.clone(),
            diff: diff.clone(),
            created_at: Utc::now(),
        };
        // The caller still receives the outcome if the document layer is down.
        if let Err(e) = self.results.save(&stored).await {
            error!(
                "Failed to persist tailored result for {}/{}: {e}",
                job.resume_id, job.user_id
            );
        }

        self.record(job, ProgressStatus::Completed, 100, None).await;
        info!(
            "Tailored {}/{} via {provider}: +{} -{} ={} lines",
            job.resume_id,
            job.user_id,
            diff.added_lines(),
            diff.removed_lines(),
            diff.unchanged_lines()
        );

        TailoringOutcome {
            text,
            diff,
            provider: provider.to_string(),
        }
    }

    async fn record(
        &self,
        job: &TailoringJob,
        status: ProgressStatus,
        progress: u8,
        attempt: Option<u32>,
    ) {
        if let Err(e) = self
            .tracker
            .transition(job.resume_id, job.user_id, status, progress, attempt)
            .await
        {
            error!(
                "Progress write ({status}) failed for {}/{}: {e}",
                job.resume_id, job.user_id
            );
        }
    }

    async fn record_failure(
        &self,
        job: &TailoringJob,
        progress: u8,
        attempt: Option<u32>,
        reason: &str,
    ) {
        if let Err(e) = self
            .tracker
            .fail(job.resume_id, job.user_id, progress, attempt, reason)
            .await
        {
            error!(
                "Progress write (failed) failed for {}/{}: {e}",
                job.resume_id, job.user_id
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
