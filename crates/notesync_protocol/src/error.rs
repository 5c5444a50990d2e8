//! Error types for protocol encoding and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding, or validating protocol
/// data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// CBOR decoding failed. For the persisted metadata blob this is a
    /// resync trigger, never a crash.
    #[error("decode error: {0}")]
    Decode(String),

    /// Specifics payload failed validation.
    #[error("invalid specifics: {reason}")]
    InvalidSpecifics {
        /// What was wrong with the payload.
        reason: String,
    },

    /// Unique position failed validation.
    #[error("invalid unique position")]
    InvalidPosition,

    /// A GUID field could not be parsed or is inconsistent.
    #[error("invalid guid: {value}")]
    InvalidGuid {
        /// The offending value.
        value: String,
    },
}

impl ProtocolError {
    /// Creates an invalid-specifics error.
    pub fn invalid_specifics(reason: impl Into<String>) -> Self {
        Self::InvalidSpecifics {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-guid error.
    pub fn invalid_guid(value: impl Into<String>) -> Self {
        Self::InvalidGuid {
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::invalid_specifics("separator with url");
        assert_eq!(err.to_string(), "invalid specifics: separator with url");

        let err = ProtocolError::InvalidPosition;
        assert_eq!(err.to_string(), "invalid unique position");
    }
}
