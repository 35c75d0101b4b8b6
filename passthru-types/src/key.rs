//! Session keys.

use crate::KeyError;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

/// Length of generated keys, in characters.
pub const GENERATED_KEY_LEN: usize = 16;

/// Opaque, unguessable key identifying one transfer attempt.
///
/// Compared case-sensitively and exactly. Generated keys are 16 characters
/// drawn from `[A-Za-z0-9]` with the thread-local CSPRNG.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let key: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_KEY_LEN)
            .map(char::from)
            .collect();
        Self(key)
    }

    /// Wrap an externally supplied key (e.g. from a request path).
    pub fn new(key: impl Into<String>) -> Result<Self, KeyError> {
        let key = key.into();
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(key))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "SessionKey({prefix}…)")
    }
}
