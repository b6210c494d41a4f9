use crate::tailoring::orchestrator::TailoringOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the quota ledger, progress tracker, provider registry and result store.
    pub tailoring: TailoringOrchestrator,
}
