//! Membership events for a single session
//!
//! Every [`Session`](crate::Session) owns one [`EventBus`]. The bus carries
//! exactly two event kinds, participant joined and participant left, and is
//! backed by a tokio broadcast channel:
//!
//! - events reach every current subscriber in the order the membership
//!   changes were committed
//! - a subscriber only sees events published after it subscribed
//! - subscribers are independent; a slow one never holds up the others
//!
//! # Usage
//!
//! ```rust,no_run
//! # use rvoip_conference_core::{Session, SessionEvent, EventKind};
//! # async fn example(session: &Session) {
//! let mut joins = session.subscribe_kind(EventKind::ParticipantJoined);
//! while let Some(SessionEvent::ParticipantJoined { participant, .. }) = joins.recv().await {
//!     println!("{} joined", participant.address());
//! }
//! # }
//! ```

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{trace, warn};

use crate::types::{Participant, SessionId};

/// A membership change on a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A participant became a member
    ParticipantJoined {
        session_id: SessionId,
        participant: Participant,
    },
    /// A participant stopped being a member
    ParticipantLeft {
        session_id: SessionId,
        participant: Participant,
    },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ParticipantJoined { .. } => EventKind::ParticipantJoined,
            Self::ParticipantLeft { .. } => EventKind::ParticipantLeft,
        }
    }

    pub fn participant(&self) -> &Participant {
        match self {
            Self::ParticipantJoined { participant, .. } | Self::ParticipantLeft { participant, .. } => {
                participant
            }
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::ParticipantJoined { session_id, .. } | Self::ParticipantLeft { session_id, .. } => {
                session_id
            }
        }
    }
}

/// Discriminant used to filter subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ParticipantJoined,
    ParticipantLeft,
}

/// Per-session publish/subscribe channel
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event was handed to. Publishing
    /// with nobody listening is not an error.
    pub fn publish(&self, event: SessionEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!("No subscribers for {:?} on session {}", event.kind(), event.session_id());
                0
            }
        }
    }

    /// Subscribe to every event kind
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
            kind: None,
        }
    }

    /// Subscribe to a single event kind
    pub fn subscribe_kind(&self, kind: EventKind) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
            kind: Some(kind),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving half of a session subscription
#[derive(Debug)]
pub struct EventSubscriber {
    rx: broadcast::Receiver<SessionEvent>,
    kind: Option<EventKind>,
}

impl EventSubscriber {
    fn accepts(&self, event: &SessionEvent) -> bool {
        self.kind.map_or(true, |kind| event.kind() == kind)
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once the session (and with it the bus) is dropped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event if one is already buffered
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Event subscriber lagged, {} events dropped", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain every buffered matching event
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Turn the subscription into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = SessionEvent> + Send {
        let kind = self.kind;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(event) if kind.map_or(true, |k| event.kind() == k) => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("Event stream lagged, {} events dropped", skipped);
                None
            }
        })
    }
}
