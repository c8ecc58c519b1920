//! Invite Coordinator
//!
//! Fans invites out to the [`UserAgent`] and applies the answers to a
//! [`Session`]. Every invite runs as its own task, so all of them are
//! outstanding at once; the caller gets a [`PendingSession`] that resolves
//! exactly once, after every invite has settled.
//!
//! ```text
//!   invite_all(session, [bob, charlie])
//!        │
//!        ├── task: UserAgent::invite(bob) ──► accepted ──► session.add_participant(bob)
//!        ├── task: UserAgent::invite(charlie) ─► rejected (session untouched)
//!        │
//!        └── fan-in: join_all ──► oneshot ──► PendingSession resolves with the session
//! ```
//!
//! Rejections never fail the aggregate. Callers look at the session's
//! membership, or at the [`InviteSummary`], to see who actually joined.

use std::future::IntoFuture;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::{ConferenceError, ConferenceResult};
use crate::events::EventSubscriber;
use crate::session::Session;
use crate::types::{
    Identity, InviteRequest, InviteStatus, Participant, ParticipantHandle, RejectReason, SessionId,
};
use crate::user_agent::UserAgent;

/// Outcome of a fan-out: the session plus how each invite settled
#[derive(Debug, Clone)]
pub struct InviteSummary {
    pub session: Arc<Session>,
    /// One entry per dispatched invite, in dispatch order
    pub invites: Vec<InviteRequest>,
}

impl InviteSummary {
    pub fn accepted(&self) -> Vec<&Identity> {
        self.with_status(InviteStatus::Accepted)
    }

    pub fn rejected(&self) -> Vec<&Identity> {
        self.with_status(InviteStatus::Rejected)
    }

    /// True when every dispatched invite was accepted
    pub fn all_accepted(&self) -> bool {
        self.invites
            .iter()
            .all(|invite| invite.status == InviteStatus::Accepted)
    }

    fn with_status(&self, status: InviteStatus) -> Vec<&Identity> {
        self.invites
            .iter()
            .filter(|invite| invite.status == status)
            .map(|invite| &invite.target)
            .collect()
    }
}

/// A session whose invites are still in flight.
///
/// The session is available right away so callers can subscribe before any
/// invite settles. Awaiting the value yields the session once the fan-out
/// completes.
pub struct PendingSession {
    session: Arc<Session>,
    ready: oneshot::Receiver<Vec<InviteRequest>>,
}

impl PendingSession {
    fn new(session: Arc<Session>, ready: oneshot::Receiver<Vec<InviteRequest>>) -> Self {
        Self { session, ready }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Subscribe to the session's membership events
    pub fn subscribe(&self) -> EventSubscriber {
        self.session.subscribe()
    }

    /// Wait for the fan-out and return the per-invite outcome
    pub async fn outcome(self) -> ConferenceResult<InviteSummary> {
        let invites = self
            .ready
            .await
            .map_err(|_| ConferenceError::internal("invite fan-out dropped before settling"))?;
        Ok(InviteSummary {
            session: self.session,
            invites,
        })
    }
}

impl IntoFuture for PendingSession {
    type Output = ConferenceResult<Arc<Session>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.outcome().await.map(|summary| summary.session) })
    }
}

#[derive(Debug)]
struct InviteTracker {
    status: Mutex<InviteStatus>,
}

type InviteKey = (SessionId, Identity);

/// Drives invites through the user agent and applies the answers
#[derive(Clone)]
pub struct InviteCoordinator {
    user_agent: Arc<dyn UserAgent>,
    /// Every unsettled invite per (session, identity); repeated invites stack up
    outstanding: Arc<DashMap<InviteKey, Vec<Arc<InviteTracker>>>>,
}

impl InviteCoordinator {
    pub fn new(user_agent: Arc<dyn UserAgent>) -> Self {
        Self {
            user_agent,
            outstanding: Arc::new(DashMap::new()),
        }
    }

    pub fn user_agent(&self) -> &Arc<dyn UserAgent> {
        &self.user_agent
    }

    /// Invite a single remote identity and wait for it to settle
    pub async fn invite_one(
        &self,
        session: &Arc<Session>,
        identity: Identity,
    ) -> ConferenceResult<Participant> {
        let participant = Participant::remote(identity);
        let tracker = self.track(session.id(), participant.identity());
        self.invite_participant(session, participant, tracker).await
    }

    /// Invite every identity concurrently.
    ///
    /// Must be called from within a tokio runtime. An empty list resolves
    /// immediately.
    pub fn invite_all(&self, session: Arc<Session>, identities: Vec<Identity>) -> PendingSession {
        self.dispatch(session, identities.into_iter().map(Participant::remote).collect())
    }

    pub(crate) fn dispatch(
        &self,
        session: Arc<Session>,
        participants: Vec<Participant>,
    ) -> PendingSession {
        self.dispatch_then(session, participants, |_| {})
    }

    /// Dispatch invites and run `on_settled` once all of them settled,
    /// before the returned [`PendingSession`] resolves.
    pub(crate) fn dispatch_then<F>(
        &self,
        session: Arc<Session>,
        participants: Vec<Participant>,
        on_settled: F,
    ) -> PendingSession
    where
        F: FnOnce(&[InviteRequest]) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        if participants.is_empty() {
            debug!("No invites to dispatch for session {}", session.id());
            on_settled(&[]);
            let _ = tx.send(Vec::new());
            return PendingSession::new(session, rx);
        }

        info!(
            "Dispatching {} invites for session {}",
            participants.len(),
            session.id()
        );

        let targets: Vec<Identity> = participants.iter().map(|p| p.identity().clone()).collect();
        let handles: Vec<_> = participants
            .into_iter()
            .map(|participant| {
                // Tracked before spawning so a cancel issued right after
                // dispatch always finds the invite.
                let tracker = self.track(session.id(), participant.identity());
                let coordinator = self.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    coordinator
                        .invite_participant(&session, participant, tracker)
                        .await
                })
            })
            .collect();

        let session_id = session.id().clone();
        tokio::spawn(async move {
            let results = join_all(handles).await;
            let invites: Vec<InviteRequest> = targets
                .into_iter()
                .zip(results)
                .map(|(target, joined)| {
                    let result = joined.unwrap_or_else(|e| {
                        Err(ConferenceError::internal(format!("invite task failed: {}", e)))
                    });
                    settled_request(target, &result)
                })
                .collect();

            info!(
                "All invites settled for session {} ({} accepted of {})",
                session_id,
                invites.iter().filter(|i| i.status == InviteStatus::Accepted).count(),
                invites.len()
            );
            on_settled(&invites);
            if tx.send(invites).is_err() {
                debug!("Nobody waiting on fan-out for session {}", session_id);
            }
        });

        PendingSession::new(session, rx)
    }

    fn track(&self, session_id: &SessionId, identity: &Identity) -> Arc<InviteTracker> {
        let tracker = Arc::new(InviteTracker {
            status: Mutex::new(InviteStatus::Outstanding),
        });
        self.outstanding
            .entry((session_id.clone(), identity.clone()))
            .or_default()
            .push(tracker.clone());
        tracker
    }

    fn forget(&self, key: &InviteKey, tracker: &Arc<InviteTracker>) {
        if let Entry::Occupied(mut entry) = self.outstanding.entry(key.clone()) {
            entry.get_mut().retain(|current| !Arc::ptr_eq(current, tracker));
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Invite a participant and apply the answer to the session
    async fn invite_participant(
        &self,
        session: &Arc<Session>,
        participant: Participant,
        tracker: Arc<InviteTracker>,
    ) -> ConferenceResult<Participant> {
        let identity = participant.identity().clone();
        let key = (session.id().clone(), identity.clone());

        if session.is_ended() {
            self.forget(&key, &tracker);
            return Err(ConferenceError::session_ended(session.id()));
        }

        debug!("INVITE {} into session {}", identity, session.id());
        let answer = self.user_agent.invite(session.id(), &identity).await;

        // The final status is written before the tracker becomes unreachable,
        // so a concurrent cancel either wins or finds the member in place.
        let (result, hang_up) = Self::settle(session, participant, &tracker, answer);
        self.forget(&key, &tracker);

        if hang_up {
            // The remote side accepted but the membership was not applied.
            if let Err(e) = self.user_agent.leave(session.id(), &identity).await {
                warn!("Failed to tear down unused leg for {}: {}", identity, e);
            }
        }
        result
    }

    /// Apply an answer under the invite's status lock.
    ///
    /// Returns the result and whether an accepted leg must be torn down.
    fn settle(
        session: &Session,
        participant: Participant,
        tracker: &InviteTracker,
        answer: Result<ParticipantHandle, RejectReason>,
    ) -> (ConferenceResult<Participant>, bool) {
        let identity = participant.identity().clone();
        let mut status = tracker.status.lock();

        match (*status, answer) {
            (InviteStatus::Cancelled, answer) => {
                info!("Invite to {} settled after cancellation, ignoring", identity);
                (
                    Err(ConferenceError::InviteCancelled { identity }),
                    answer.is_ok(),
                )
            }
            (_, Ok(handle)) => match session.add_participant(participant.clone()) {
                Ok(_) => {
                    *status = InviteStatus::Accepted;
                    debug!(
                        "Invite to {} accepted (dialog {:?})",
                        identity, handle.dialog_id
                    );
                    let joined = session
                        .participant(&identity)
                        .unwrap_or_else(|| participant.connected());
                    (Ok(joined), false)
                }
                Err(e) => {
                    *status = InviteStatus::Rejected;
                    warn!("Accepted invite for {} could not be applied: {}", identity, e);
                    (Err(e), true)
                }
            },
            (_, Err(reason)) => {
                *status = InviteStatus::Rejected;
                info!("Invite to {} rejected: {}", identity, reason);
                (Err(ConferenceError::invite_rejected(&identity, reason)), false)
            }
        }
    }

    /// Cancel every outstanding invite for `identity` so late accepts are ignored.
    ///
    /// Returns `true` if at least one outstanding invite was cancelled.
    pub fn cancel(&self, session_id: &SessionId, identity: &Identity) -> bool {
        let trackers = self.trackers(session_id, identity);

        let mut cancelled = 0;
        for tracker in trackers {
            let mut status = tracker.status.lock();
            if *status == InviteStatus::Outstanding {
                *status = InviteStatus::Cancelled;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(
                "Cancelled {} outstanding invites to {} in session {}",
                cancelled, identity, session_id
            );
        }
        cancelled > 0
    }

    pub fn is_outstanding(&self, session_id: &SessionId, identity: &Identity) -> bool {
        self.trackers(session_id, identity)
            .iter()
            .any(|tracker| *tracker.status.lock() == InviteStatus::Outstanding)
    }

    /// Number of invites that have not settled yet
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.iter().map(|entry| entry.value().len()).sum()
    }

    fn trackers(&self, session_id: &SessionId, identity: &Identity) -> Vec<Arc<InviteTracker>> {
        self.outstanding
            .get(&(session_id.clone(), identity.clone()))
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

fn settled_request(target: Identity, result: &ConferenceResult<Participant>) -> InviteRequest {
    let (status, reject_reason) = match result {
        Ok(_) => (InviteStatus::Accepted, None),
        Err(ConferenceError::InviteCancelled { .. }) => (InviteStatus::Cancelled, None),
        Err(ConferenceError::InviteRejected { reason, .. }) => {
            (InviteStatus::Rejected, Some(reason.clone()))
        }
        Err(_) => (InviteStatus::Rejected, None),
    };
    InviteRequest {
        target,
        status,
        reject_reason,
    }
}
