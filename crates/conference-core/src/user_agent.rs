//! Signaling transport seam
//!
//! The [`UserAgent`] trait is the only way this crate talks to the wire. It
//! sends invites and departures; inbound traffic comes back as
//! [`InboundSignal`] values that the [`Endpoint`](crate::Endpoint) maps onto
//! the session API.
//!
//! [`LoopbackUserAgent`] is an in-memory implementation with per-address
//! rules, used by the tests and handy for wiring up an endpoint without a
//! SIP stack.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::debug;

use crate::errors::ConferenceResult;
use crate::types::{Identity, ParticipantHandle, RejectReason, SessionId};

/// Outbound signaling operations used by the invite coordinator
#[async_trait]
pub trait UserAgent: Send + Sync + 'static {
    /// Invite `identity` into a session and wait for the answer.
    ///
    /// Implementations must eventually settle every invite. Transport
    /// failures are reported as a [`RejectReason`].
    async fn invite(
        &self,
        session_id: &SessionId,
        identity: &Identity,
    ) -> Result<ParticipantHandle, RejectReason>;

    /// Tell the remote side that `identity` left the session
    async fn leave(&self, session_id: &SessionId, identity: &Identity) -> ConferenceResult<()>;
}

/// Signaling received from remote parties
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundSignal {
    /// A remote party invites the local endpoint into its session
    Invite { session_id: SessionId, from: Identity },
    /// A remote party joined a session the local endpoint is in
    Joined { session_id: SessionId, identity: Identity },
    /// A remote party left a session the local endpoint is in
    Left { session_id: SessionId, identity: Identity },
}

impl InboundSignal {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Invite { session_id, .. }
            | Self::Joined { session_id, .. }
            | Self::Left { session_id, .. } => session_id,
        }
    }
}

/// How the loopback agent answers invites for one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteRule {
    Accept,
    Reject(RejectReason),
    /// Accept after a delay
    Delay(Duration),
    /// Hold the invite until released
    Park,
}

type ParkedAnswer = oneshot::Sender<Result<ParticipantHandle, RejectReason>>;

/// In-memory user agent that answers invites from configured rules
#[derive(Default)]
pub struct LoopbackUserAgent {
    rules: DashMap<Identity, InviteRule>,
    parked: DashMap<Identity, Vec<ParkedAnswer>>,
    invites: Mutex<Vec<(SessionId, Identity)>>,
    leaves: Mutex<Vec<(SessionId, Identity)>>,
    dispatched: Notify,
}

impl LoopbackUserAgent {
    /// Create an agent that accepts every invite
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for one address
    pub fn set_rule(&self, address: &str, rule: InviteRule) -> ConferenceResult<()> {
        let identity = Identity::parse(address)?;
        debug!("Loopback rule for {}: {:?}", identity, rule);
        self.rules.insert(identity, rule);
        Ok(())
    }

    pub fn reject(&self, address: &str, reason: RejectReason) -> ConferenceResult<()> {
        self.set_rule(address, InviteRule::Reject(reason))
    }

    pub fn delay(&self, address: &str, delay: Duration) -> ConferenceResult<()> {
        self.set_rule(address, InviteRule::Delay(delay))
    }

    pub fn park(&self, address: &str) -> ConferenceResult<()> {
        self.set_rule(address, InviteRule::Park)
    }

    /// Answer every parked invite for `address` with `answer`.
    ///
    /// Returns how many invites were released.
    pub fn release(
        &self,
        address: &str,
        answer: Result<(), RejectReason>,
    ) -> ConferenceResult<usize> {
        let identity = Identity::parse(address)?;
        let waiters = self
            .parked
            .remove(&identity)
            .map(|(_, waiters)| waiters)
            .unwrap_or_default();

        let released = waiters.len();
        for waiter in waiters {
            let outcome = answer
                .clone()
                .map(|_| Self::handle_for(&identity));
            // A dropped receiver means the invite task is gone; nothing to answer.
            let _ = waiter.send(outcome);
        }
        debug!("Released {} parked invites for {}", released, identity);
        Ok(released)
    }

    /// Every invite sent so far, in dispatch order
    pub fn invites_sent(&self) -> Vec<(SessionId, Identity)> {
        self.invites.lock().clone()
    }

    /// Every departure reported so far
    pub fn leaves_sent(&self) -> Vec<(SessionId, Identity)> {
        self.leaves.lock().clone()
    }

    /// Wait until at least `count` invites have been dispatched
    pub async fn wait_for_invites(&self, count: usize) {
        loop {
            let notified = self.dispatched.notified();
            if self.invites.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn handle_for(identity: &Identity) -> ParticipantHandle {
        ParticipantHandle::new(identity.clone())
            .with_dialog_id(format!("loopback-{}", uuid::Uuid::new_v4()))
    }
}

#[async_trait]
impl UserAgent for LoopbackUserAgent {
    async fn invite(
        &self,
        session_id: &SessionId,
        identity: &Identity,
    ) -> Result<ParticipantHandle, RejectReason> {
        let rule = self
            .rules
            .get(identity)
            .map(|rule| rule.value().clone())
            .unwrap_or(InviteRule::Accept);

        let parked = if rule == InviteRule::Park {
            let (tx, rx) = oneshot::channel();
            self.parked.entry(identity.clone()).or_default().push(tx);
            Some(rx)
        } else {
            None
        };

        self.invites.lock().push((session_id.clone(), identity.clone()));
        self.dispatched.notify_waiters();
        debug!("Loopback INVITE {} into {} ({:?})", identity, session_id, rule);

        match (rule, parked) {
            (InviteRule::Reject(reason), _) => Err(reason),
            (InviteRule::Delay(delay), _) => {
                tokio::time::sleep(delay).await;
                Ok(Self::handle_for(identity))
            }
            (_, Some(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(RejectReason::transport("loopback agent dropped invite"))),
            _ => Ok(Self::handle_for(identity)),
        }
    }

    async fn leave(&self, session_id: &SessionId, identity: &Identity) -> ConferenceResult<()> {
        debug!("Loopback BYE {} from {}", identity, session_id);
        self.leaves.lock().push((session_id.clone(), identity.clone()));
        Ok(())
    }
}
