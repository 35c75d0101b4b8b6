//! Error types for passthru-types.

use thiserror::Error;

/// Errors raised while building a [`crate::SessionKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key string was empty.
    #[error("session key must not be empty")]
    Empty,
}
