//! Error taxonomy for the aggregation engine.
//!
//! Only structural failures surface here: a malformed window, an identity
//! the directory does not know, a store without any usable numeric path, or
//! a failed fetch. Field-level extraction misses are not errors; they
//! silently shrink the denominator of the affected average.

use thiserror::Error;

use crate::store::{NumericCapability, StoreError};

/// Errors surfaced to callers of the aggregation engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or inverted time bounds. Never retried.
    #[error("invalid window: {reason}")]
    InvalidWindow { reason: String },

    /// Identity lookup failed against the device directory.
    #[error("unknown identity: {identity}")]
    UnknownIdentity { identity: String },

    /// The store offers neither query-level numeric extraction nor raw text
    /// to extract from. Non-numeric statistics are still produced.
    #[error("backend cannot compute numeric rollups (capability: {capability:?})")]
    UnsupportedBackend { capability: NumericCapability },

    /// The record fetch failed or timed out. Retry policy belongs to the
    /// caller; the engine never partially aggregates.
    #[error("record fetch failed")]
    Fetch {
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    pub fn invalid_window(reason: impl Into<String>) -> Self {
        Self::InvalidWindow {
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(source: StoreError) -> Self {
        Self::Fetch { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_window_message_carries_reason() {
        let err = EngineError::invalid_window("start >= end");
        assert_eq!(err.to_string(), "invalid window: start >= end");
    }

    #[test]
    fn test_unknown_identity_message_carries_identity() {
        let err = EngineError::UnknownIdentity {
            identity: "user-7".to_string(),
        };
        assert!(err.to_string().contains("user-7"));
    }

    #[test]
    fn test_store_error_maps_to_fetch() {
        let err: EngineError = StoreError::Unavailable {
            detail: "connection refused".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::Fetch { .. }));
    }
}
