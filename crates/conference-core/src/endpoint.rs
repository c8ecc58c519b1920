//! Endpoint
//!
//! The local addressable identity. An endpoint creates sessions by inviting
//! targets, joins and leaves existing sessions, and maps inbound signaling
//! from its [`UserAgent`] onto the sessions in its [`SessionStore`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_conference_core::{Endpoint, LoopbackUserAgent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = Endpoint::builder()
//!     .address("alice@example.com")
//!     .user_agent(Arc::new(LoopbackUserAgent::new()))
//!     .build()?;
//!
//! let session = endpoint
//!     .create_session(vec!["bob@example.com", "charlie@example.com"])?
//!     .await?;
//! println!("{} members", session.len());
//!
//! endpoint.leave(&session).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::builder::EndpointBuilder;
use crate::config::EndpointConfig;
use crate::coordinator::{InviteCoordinator, PendingSession};
use crate::credentials::CredentialProvider;
use crate::errors::{ConferenceError, ConferenceResult};
use crate::identity::{IdentityResolver, InviteTarget};
use crate::session::Session;
use crate::store::SessionStore;
use crate::types::{Identity, InviteStatus, Participant, SessionId};
use crate::user_agent::{InboundSignal, UserAgent};

/// A local addressable party that creates, joins and leaves sessions
pub struct Endpoint {
    local: Participant,
    coordinator: InviteCoordinator,
    store: Arc<SessionStore>,
    config: EndpointConfig,
}

impl Endpoint {
    /// Create an endpoint; the credential provider is consulted exactly once
    pub fn new(
        credentials: &dyn CredentialProvider,
        user_agent: Arc<dyn UserAgent>,
        store: Arc<SessionStore>,
        config: EndpointConfig,
    ) -> ConferenceResult<Self> {
        config.validate()?;
        let address = credentials.address()?;
        let identity = Identity::parse(&address)
            .map_err(|_| ConferenceError::credentials(format!("unusable address {:?}", address)))?;

        info!("Endpoint {} ready", identity);
        Ok(Self {
            local: Participant::local(identity),
            coordinator: InviteCoordinator::new(user_agent),
            store,
            config,
        })
    }

    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::new()
    }

    pub fn address(&self) -> &str {
        self.local.address()
    }

    pub fn identity(&self) -> &Identity {
        self.local.identity()
    }

    pub fn local_participant(&self) -> &Participant {
        &self.local
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &InviteCoordinator {
        &self.coordinator
    }

    /// Create a session containing this endpoint and invite `targets` into it.
    ///
    /// Target resolution happens before anything is dispatched: an invalid
    /// target fails here and no invite is sent. The returned
    /// [`PendingSession`] resolves once every invite has settled, whether
    /// accepted or not. Must be called from within a tokio runtime.
    pub fn create_session(
        &self,
        targets: impl Into<InviteTarget>,
    ) -> ConferenceResult<PendingSession> {
        let identities: Vec<Identity> = IdentityResolver::resolve(&targets.into())?
            .into_iter()
            .filter(|identity| identity != self.identity())
            .collect();

        let session = Arc::new(Session::with_initiator(
            SessionId::new(),
            self.local.clone(),
            self.config.event_capacity,
        ));
        self.store.register(session.clone());
        info!(
            "{} created session {} inviting {} targets",
            self.identity(),
            session.id(),
            identities.len()
        );

        Ok(self.coordinator.invite_all(session, identities))
    }

    /// Join an existing session through the user agent.
    ///
    /// Joining a session this endpoint is already a member of resolves
    /// immediately without sending or publishing anything. The session is
    /// registered in the store only once the self-invite is accepted.
    pub fn join(&self, session: &Arc<Session>) -> ConferenceResult<PendingSession> {
        if session.is_ended() {
            return Err(ConferenceError::session_ended(session.id()));
        }
        if session.contains(self.identity()) {
            debug!("{} already in session {}", self.identity(), session.id());
            self.store.register(session.clone());
            return Ok(self.coordinator.dispatch(session.clone(), Vec::new()));
        }

        info!("{} joining session {}", self.identity(), session.id());
        let store = self.store.clone();
        let joined = session.clone();
        let identity = self.identity().clone();
        Ok(self.coordinator.dispatch_then(
            session.clone(),
            vec![self.local.clone()],
            move |invites| {
                let accepted = invites
                    .iter()
                    .any(|invite| invite.status == InviteStatus::Accepted);
                if accepted && joined.contains(&identity) {
                    store.register(joined);
                }
            },
        ))
    }

    /// Leave a session.
    ///
    /// Cancels an outstanding self-invite and removes this endpoint's
    /// participant. Both happen before the first suspension point, so a
    /// late accept can no longer restore membership. Returns `false` when
    /// there was nothing to leave.
    pub async fn leave(&self, session: &Session) -> ConferenceResult<bool> {
        let identity = self.identity();
        let cancelled = self.coordinator.cancel(session.id(), identity);
        let removed = session.remove_participant(identity);

        if !cancelled && !removed {
            debug!("{} is not in session {}", identity, session.id());
            return Ok(false);
        }
        info!("{} left session {}", identity, session.id());

        self.forget_if_ended(session);
        if removed {
            self.coordinator
                .user_agent()
                .leave(session.id(), identity)
                .await?;
        }
        Ok(true)
    }

    /// End a session for every member
    pub async fn end_session(&self, session: &Session) -> ConferenceResult<()> {
        let was_member = session.contains(self.identity());
        if !session.end() {
            return Ok(());
        }
        self.store.unregister(session.id());

        if was_member {
            self.coordinator
                .user_agent()
                .leave(session.id(), self.identity())
                .await?;
        }
        Ok(())
    }

    /// Apply one inbound signal.
    ///
    /// Returns the affected session, or `None` when the signal was ignored
    /// (unknown session, or inbound invites disabled).
    pub fn handle_inbound(&self, signal: InboundSignal) -> ConferenceResult<Option<Arc<Session>>> {
        match signal {
            InboundSignal::Invite { session_id, from } => {
                if !self.config.accept_inbound {
                    info!("Ignoring invite from {} to session {}", from, session_id);
                    return Ok(None);
                }

                let session = self.store.get_or_insert_with(&session_id, || {
                    Session::with_initiator(
                        session_id.clone(),
                        Participant::remote(from.clone()),
                        self.config.event_capacity,
                    )
                });
                session.add_participant(Participant::remote(from))?;
                session.add_participant(self.local.clone())?;
                info!("{} accepted invite into session {}", self.identity(), session_id);
                Ok(Some(session))
            }
            InboundSignal::Joined { session_id, identity } => {
                let Some(session) = self.store.get(&session_id) else {
                    debug!("Join for unknown session {}", session_id);
                    return Ok(None);
                };
                session.add_participant(Participant::remote(identity))?;
                Ok(Some(session))
            }
            InboundSignal::Left { session_id, identity } => {
                let Some(session) = self.store.get(&session_id) else {
                    debug!("Leave for unknown session {}", session_id);
                    return Ok(None);
                };
                session.remove_participant(&identity);
                self.forget_if_ended(&session);
                Ok(Some(session))
            }
        }
    }

    /// Feed inbound signals from a channel until it closes
    pub fn spawn_inbound(self: Arc<Self>, mut signals: mpsc::Receiver<InboundSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let session_id = signal.session_id().clone();
                if let Err(e) = self.handle_inbound(signal) {
                    warn!("Inbound signal for session {} failed: {}", session_id, e);
                }
            }
            debug!("Inbound signal channel for {} closed", self.identity());
        })
    }

    fn forget_if_ended(&self, session: &Session) {
        if self.config.end_empty_sessions && session.is_ended() {
            self.store.unregister(session.id());
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address())
            .field("sessions", &self.store.len())
            .field("config", &self.config)
            .finish()
    }
}
