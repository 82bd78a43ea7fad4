//! Error taxonomy for the harvest engine.
//!
//! Per-item errors are absorbed at the orchestrator boundary and turned into
//! ledger statuses; only [`EngineError::Setup`] aborts a batch.

use thiserror::Error;

/// Errors surfaced by the page-automation layer. All of these are transient
/// from the engine's point of view and feed the recovery controller.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error("automation target closed mid-operation: {0}")]
    TargetClosed(String),
    #[error("browser error: {0}")]
    Browser(String),
}

/// Why the verifier refused a candidate capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("capture is {len} chars, below the {min} minimum")]
    TooShort { len: usize, min: usize },
    #[error("capture is identical to the previous capture (stale)")]
    Stale,
    #[error("capture looks like an import-only placeholder")]
    ImportOnly,
}

/// Typed failure from a single extraction strategy attempt.
#[derive(Debug, Error)]
pub enum StrategyFailure {
    #[error("no copy trigger found on page")]
    NoTrigger,
    #[error("clipboard empty after trigger")]
    ClipboardEmpty,
    #[error("page DOM shape not recognized")]
    DomShapeUnrecognized,
    #[error("strategy not applicable")]
    NotApplicable,
    #[error(transparent)]
    Automation(#[from] AutomationError),
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Automation layer could not be initialized at all. Fatal to the batch;
    /// the only error the orchestrator propagates.
    #[error("cannot initialize automation layer: {0}")]
    Setup(String),
    #[error(transparent)]
    Automation(#[from] AutomationError),
    #[error("content rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("persistence failed: {0}")]
    Persistence(#[from] std::io::Error),
}
