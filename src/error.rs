//! Error Types Module
//!
//! Fatal analysis errors and recoverable provider errors. Provider errors
//! never escape the orchestrator: it degrades, logs, and continues.

use std::time::Duration;
use thiserror::Error;

// ===================== ANALYSIS ERRORS =====================

/// Errors an analysis can surface to the caller.
///
/// Everything else (provider outages, weak bias fits, degenerate baselines)
/// is handled internally by degradation and logged.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The request failed up-front validation (coordinates or radius out of
    /// range). Fatal, nothing was computed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The analysis was cancelled co-operatively. No partial results.
    #[error("analysis cancelled")]
    Cancelled,
}

// ===================== PROVIDER ERRORS =====================

/// Errors from external data providers (exclusion polygons, land prices).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached or refused the request.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered, but only after its time budget elapsed.
    #[error("provider exceeded its {0:?} time budget")]
    Timeout(Duration),

    /// The provider returned data we could not interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

// ===================== TESTS =====================
