//! Session Store
//!
//! Registry of the sessions an endpoint knows about, keyed by session id.
//! One store is injected into each endpoint; several endpoints in the same
//! process may share a store or keep their own.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::session::Session;
use crate::types::{SessionId, SessionState};

/// Counters describing store activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStoreStats {
    /// Sessions registered since the store was created
    pub total_created: usize,
    /// Sessions unregistered since the store was created
    pub total_ended: usize,
    /// Registered sessions that have not ended
    pub active: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_created: usize,
    total_ended: usize,
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Session>>,
    counters: Mutex<Counters>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns `false` if the id was already registered.
    pub fn register(&self, session: Arc<Session>) -> bool {
        let id = session.id().clone();
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                self.counters.lock().total_created += 1;
                debug!("Registered session: {}", id);
                true
            }
        }
    }

    /// Look up a session, creating and registering it if unknown
    pub fn get_or_insert_with(
        &self,
        id: &SessionId,
        create: impl FnOnce() -> Session,
    ) -> Arc<Session> {
        let entry = self.sessions.entry(id.clone()).or_insert_with(|| {
            self.counters.lock().total_created += 1;
            debug!("Registered session: {}", id);
            Arc::new(create())
        });
        entry.value().clone()
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn unregister(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            self.counters.lock().total_ended += 1;
            debug!("Unregistered session: {}", id);
        }
        removed
    }

    /// Unregister every session that has ended; returns how many were removed
    pub fn prune_ended(&self) -> usize {
        let ended: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_ended())
            .map(|entry| entry.key().clone())
            .collect();

        ended
            .iter()
            .filter(|id| self.unregister(id).is_some())
            .count()
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> SessionStoreStats {
        let active = self
            .sessions
            .iter()
            .filter(|entry| entry.value().state() != SessionState::Ended)
            .count();
        let counters = self.counters.lock();
        SessionStoreStats {
            total_created: counters.total_created,
            total_ended: counters.total_ended,
            active,
        }
    }
}
