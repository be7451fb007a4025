//! Crate-wide error taxonomy.
//!
//! Each subsystem defines its own `thiserror` enum; this module unifies them
//! behind a single `EngineError` with a stable, machine-readable `ErrorKind`
//! that callers across the façade of `crate::api` can match on without
//! depending on which subsystem produced the failure.

use thiserror::Error;

use crate::engine::MatchingError;
use crate::ledger::LedgerError;
use crate::risk::RiskError;

/// Stable, machine-readable error classification surfaced to callers.
///
/// Maps onto the five-tier taxonomy: input, policy, resource, conflict, internal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    UnknownSymbol,
    RateLimited,
    RiskRejected,
    InsufficientBalance,
    SelfTrading,
    NotFound,
    Terminal,
    Forbidden,
    Internal,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Matching(#[from] MatchingError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Matching(e) => e.kind(),
            EngineError::Risk(e) => e.kind(),
            EngineError::Ledger(e) => e.kind(),
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_error_maps_to_expected_kind() {
        let err: EngineError = MatchingError::UnknownSymbol("BTCUSDT".into()).into();
        assert_eq!(err.kind(), ErrorKind::UnknownSymbol);
    }
}
