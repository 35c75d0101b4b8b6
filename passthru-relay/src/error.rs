//! Error types for passthru-relay.

use passthru_types::{SessionKey, TransferOutcome};

/// Main error type for relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// An upload arrived with a key that already has an open session.
    #[error("session key already in use: {key:?}")]
    DuplicateKey {
        /// The contested key.
        key: SessionKey,
    },

    /// No downloader arrived within the wait bound.
    #[error("no peer arrived within {waited_secs}s")]
    PeerTimeout {
        /// How long the uploader waited, in seconds.
        waited_secs: u64,
    },

    /// A download referenced an unknown, expired or already claimed key.
    #[error("session not found")]
    KeyNotFound,

    /// The upload body did not have the expected multipart structure.
    #[error("invalid upload request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// Reading the upload or writing the download failed mid-copy.
    #[error("relay I/O failure: {0}")]
    RelayIo(String),
}

impl RelayError {
    /// Shorthand for [`RelayError::InvalidRequest`].
    pub fn invalid(reason: impl ToString) -> Self {
        Self::InvalidRequest {
            reason: reason.to_string(),
        }
    }

    /// The generic outcome an uploader may be told about this error.
    ///
    /// Receiver-side detail is never part of the outcome.
    pub fn outcome(&self) -> TransferOutcome {
        match self {
            Self::DuplicateKey { .. } => TransferOutcome::Conflict,
            Self::PeerTimeout { .. } => TransferOutcome::TimedOut,
            _ => TransferOutcome::Failed,
        }
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
