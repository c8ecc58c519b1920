//! Session Implementation
//!
//! Membership state machine for one multi-party call. All mutation goes
//! through a single per-session lock, and membership events are published
//! while that lock is held, so the event order seen by subscribers is the
//! commit order.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::{ConferenceError, ConferenceResult};
use crate::events::{EventBus, EventKind, EventSubscriber, SessionEvent};
use crate::types::{Identity, Participant, SessionId, SessionState};

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug)]
struct Membership {
    state: SessionState,
    participants: IndexMap<Identity, Participant>,
}

/// An active multi-party call and its live participant set
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    membership: Mutex<Membership>,
    events: EventBus,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a bare session with no members, in the `Pending` state
    pub fn new() -> Self {
        Self::with_id(SessionId::new(), DEFAULT_EVENT_CAPACITY)
    }

    /// Create a bare session with a known id
    pub fn with_id(id: SessionId, event_capacity: usize) -> Self {
        debug!("Created session {}", id);
        Self {
            id,
            membership: Mutex::new(Membership {
                state: SessionState::Pending,
                participants: IndexMap::new(),
            }),
            events: EventBus::new(event_capacity),
            created_at: Utc::now(),
        }
    }

    /// Create a session that already contains its initiator, in the `Active` state.
    ///
    /// The initiator is inserted before anyone can subscribe, so no event is
    /// published for it.
    pub fn with_initiator(id: SessionId, initiator: Participant, event_capacity: usize) -> Self {
        let session = Self::with_id(id, event_capacity);
        {
            let mut membership = session.membership.lock();
            membership
                .participants
                .insert(initiator.identity().clone(), initiator.connected());
            membership.state = SessionState::Active;
        }
        session
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.membership.lock().state
    }

    pub fn is_ended(&self) -> bool {
        self.state() == SessionState::Ended
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Add a participant.
    ///
    /// Returns `Ok(false)` without publishing anything when the identity is
    /// already a member. Fails with `SessionEnded` once the session ended.
    pub fn add_participant(&self, participant: Participant) -> ConferenceResult<bool> {
        let mut membership = self.membership.lock();

        if membership.participants.contains_key(participant.identity()) {
            debug!("{} already in session {}", participant.identity(), self.id);
            return Ok(false);
        }
        if membership.state == SessionState::Ended {
            return Err(ConferenceError::session_ended(&self.id));
        }

        let participant = participant.connected();
        membership
            .participants
            .insert(participant.identity().clone(), participant.clone());
        if membership.state == SessionState::Pending {
            debug!("Session {} state: Pending -> Active", self.id);
            membership.state = SessionState::Active;
        }

        info!("{} joined session {}", participant.identity(), self.id);
        self.events.publish(SessionEvent::ParticipantJoined {
            session_id: self.id.clone(),
            participant,
        });
        Ok(true)
    }

    /// Remove a participant by identity.
    ///
    /// Returns `false` when the identity was not a member. Removing the last
    /// member ends the session.
    pub fn remove_participant(&self, identity: &Identity) -> bool {
        let mut membership = self.membership.lock();

        let Some(participant) = membership.participants.shift_remove(identity) else {
            return false;
        };

        info!("{} left session {}", identity, self.id);
        self.events.publish(SessionEvent::ParticipantLeft {
            session_id: self.id.clone(),
            participant: participant.disconnected(),
        });

        if membership.participants.is_empty() {
            debug!("Session {} state: {:?} -> Ended", self.id, membership.state);
            membership.state = SessionState::Ended;
        }
        true
    }

    /// End the session, removing every member in join order.
    ///
    /// Returns `false` if the session had already ended.
    pub fn end(&self) -> bool {
        let mut membership = self.membership.lock();
        if membership.state == SessionState::Ended {
            return false;
        }

        for (_, participant) in membership.participants.drain(..) {
            self.events.publish(SessionEvent::ParticipantLeft {
                session_id: self.id.clone(),
                participant: participant.disconnected(),
            });
        }
        membership.state = SessionState::Ended;
        info!("Session {} ended", self.id);
        true
    }

    /// Snapshot of the current members in join order
    pub fn participants(&self) -> Vec<Participant> {
        self.membership.lock().participants.values().cloned().collect()
    }

    pub fn participant(&self, identity: &Identity) -> Option<Participant> {
        self.membership.lock().participants.get(identity).cloned()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.membership.lock().participants.contains_key(identity)
    }

    /// Membership check by address; unparseable addresses are never members
    pub fn contains_address(&self, address: &str) -> bool {
        Identity::parse(address)
            .map(|identity| self.contains(&identity))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.membership.lock().participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribe to every membership event published from now on
    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    /// Subscribe to one kind of membership event
    pub fn subscribe_kind(&self, kind: EventKind) -> EventSubscriber {
        self.events.subscribe_kind(kind)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
