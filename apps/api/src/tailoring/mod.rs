// Tailoring job orchestration.
// Implements: quota ledger, progress tracking, backoff retries, provider
// fallback, line diff. All provider calls go through llm_client.

pub mod backoff;
pub mod diff;
pub mod handlers;
pub mod mode;
pub mod orchestrator;
pub mod pg_store;
pub mod progress;
pub mod prompts;
pub mod quota;
pub mod store;
