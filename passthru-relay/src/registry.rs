//! Registry of open sessions, keyed by session key.
//!
//! No operation here blocks. Insertion is an atomic test-and-insert on the
//! map entry, so at most one session exists per key.

use crate::error::{RelayError, Result};
use crate::session::Session;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use passthru_types::SessionKey;
use std::sync::Arc;

/// Concurrent map from key to open session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `session` if its key is free.
    ///
    /// The returned [`Registration`] removes the entry when dropped, so the
    /// key becomes reusable however the uploader's handler exits.
    pub fn register(&self, session: Arc<Session>) -> Result<Registration<'_>> {
        match self.sessions.entry(session.key().clone()) {
            Entry::Occupied(_) => {
                return Err(RelayError::DuplicateKey {
                    key: session.key().clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(session.clone());
            }
        }

        // The shard lock is released here; len() takes every shard lock.
        tracing::debug!(
            "Registered session {:?} (total: {})",
            session.key(),
            self.sessions.len()
        );
        Ok(Registration {
            registry: self,
            session,
        })
    }

    /// Look up the open session for `key`.
    pub fn lookup(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Remove the session for `key`. Idempotent.
    pub fn remove(&self, key: &SessionKey) -> bool {
        self.sessions.remove(key).is_some()
    }

    /// Whether `key` currently has an open session.
    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.contains_key(key)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Number of open sessions a downloader has already claimed.
    pub fn claimed(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().is_claimed())
            .count()
    }

    /// Whether no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Scoped registration held by the uploader's handler.
#[derive(Debug)]
pub struct Registration<'a> {
    registry: &'a SessionRegistry,
    session: Arc<Session>,
}

impl Registration<'_> {
    /// The registered session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        // Only remove our own entry.
        let removed = self
            .registry
            .sessions
            .remove_if(self.session.key(), |_, current| {
                Arc::ptr_eq(current, &self.session)
            })
            .is_some();

        if removed {
            tracing::debug!(
                "Unregistered session {:?} (remaining: {})",
                self.session.key(),
                self.registry.sessions.len()
            );
        }
    }
}
