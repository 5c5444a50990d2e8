//! Error types for the reconciliation engine.
//!
//! Three tiers, matching the propagation policy: per-update problems are
//! handled inside the batch loop (logged, never surfaced), resync-level
//! problems drop the Tracker and ask for a clean restart, and fatal problems
//! disconnect the session while leaving local data intact.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Local tree mutation failed.
    #[error("model error: {0}")]
    Model(#[from] notesync_model::ModelError),

    /// Protocol encoding/decoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] notesync_protocol::ProtocolError),

    /// Persisted metadata is stale or foreign; the Tracker was dropped and
    /// the caller should restart sync clean.
    #[error("resync required: {reason}")]
    ResyncRequired {
        /// Why the metadata could not be trusted.
        reason: String,
    },

    /// The initial update batch did not contain all permanent roots.
    #[error("permanent roots missing from initial update batch")]
    MissingPermanentRoots,

    /// Tracked/remote item count exceeded the configured ceiling.
    #[error("item count {count} exceeds the limit of {limit}")]
    ItemCountExceeded {
        /// The offending count.
        count: usize,
        /// The configured ceiling.
        limit: usize,
    },

    /// Operation requires a connected session.
    #[error("sync is not connected")]
    NotConnected,

    /// Operation not valid in the current processor state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target.
        to: String,
    },
}

impl EngineError {
    /// Creates a resync-required error.
    pub fn resync_required(reason: impl Into<String>) -> Self {
        Self::ResyncRequired {
            reason: reason.into(),
        }
    }

    /// Returns true if this error is fatal for the sync session.
    ///
    /// Fatal errors disconnect sync and surface through the error callback;
    /// local data stays intact and keeps accumulating unsynced changes.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::MissingPermanentRoots | EngineError::ItemCountExceeded { .. }
        )
    }

    /// Returns true if this error is recovered by dropping local sync
    /// metadata and restarting sync clean.
    #[must_use]
    pub fn requires_resync(&self) -> bool {
        matches!(self, EngineError::ResyncRequired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(EngineError::MissingPermanentRoots.is_fatal());
        assert!(EngineError::ItemCountExceeded {
            count: 100_001,
            limit: 100_000
        }
        .is_fatal());
        assert!(!EngineError::NotConnected.is_fatal());
        assert!(!EngineError::resync_required("stale cache guid").is_fatal());
    }

    #[test]
    fn resync_classification() {
        assert!(EngineError::resync_required("cache guid mismatch").requires_resync());
        assert!(!EngineError::MissingPermanentRoots.requires_resync());
    }

    #[test]
    fn error_display() {
        let err = EngineError::ItemCountExceeded {
            count: 5,
            limit: 4,
        };
        assert_eq!(err.to_string(), "item count 5 exceeds the limit of 4");
    }
}
