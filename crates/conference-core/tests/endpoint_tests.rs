//! Endpoint Tests
//!
//! End-to-end membership scenarios driven through `Endpoint` with an
//! in-memory user agent.

use std::collections::BTreeSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tracing_test::traced_test;

use rvoip_conference_core::{
    ConferenceError, Endpoint, EventKind, Identity, InviteStatus, InviteTarget, LoopbackUserAgent,
    Participant, RejectReason, Session, SessionEvent, SessionState, SessionStore,
};

const ALICE: &str = "alice@twil.io";

fn endpoint_with(address: &str) -> (Endpoint, Arc<LoopbackUserAgent>) {
    let agent = Arc::new(LoopbackUserAgent::new());
    let endpoint = Endpoint::builder()
        .address(address)
        .user_agent(agent.clone())
        .build()
        .unwrap();
    (endpoint, agent)
}

fn alice() -> (Endpoint, Arc<LoopbackUserAgent>) {
    endpoint_with(ALICE)
}

fn addresses(session: &Session) -> BTreeSet<String> {
    session
        .participants()
        .iter()
        .map(|p| p.address().to_string())
        .collect()
}

fn set(addresses: &[&str]) -> BTreeSet<String> {
    addresses.iter().map(|a| a.to_string()).collect()
}

fn event_log(events: Vec<SessionEvent>) -> Vec<(EventKind, String)> {
    events
        .into_iter()
        .map(|e| (e.kind(), e.participant().address().to_string()))
        .collect()
}

#[tokio::test]
async fn test_constructor_exposes_address() {
    let (endpoint, _) = alice();
    assert_eq!(endpoint.address(), ALICE);
    assert!(endpoint.local_participant().is_local());
}

#[tokio::test]
async fn test_create_session_without_participants() {
    let (endpoint, agent) = alice();

    let session = endpoint.create_session(Vec::<&str>::new()).unwrap().await.unwrap();

    assert_eq!(addresses(&session), set(&[ALICE]));
    assert_eq!(session.state(), SessionState::Active);
    assert!(agent.invites_sent().is_empty());
    assert!(endpoint.store().contains(session.id()));
}

#[tokio::test]
async fn test_create_session_inviting_self() {
    let (endpoint, agent) = alice();

    let session = endpoint.create_session(&endpoint).unwrap().await.unwrap();

    assert_eq!(addresses(&session), set(&[ALICE]));
    assert!(agent.invites_sent().is_empty());
}

#[tokio::test]
async fn test_create_session_inviting_address() {
    let (endpoint, _) = alice();

    let pending = endpoint.create_session("bob@twil.io").unwrap();
    let mut events = pending.subscribe();
    let session = pending.await.unwrap();

    assert_eq!(addresses(&session), set(&[ALICE, "bob@twil.io"]));
    // the join was published before the creation future resolved
    assert_eq!(
        event_log(events.drain()),
        vec![(EventKind::ParticipantJoined, "bob@twil.io".to_string())]
    );
}

#[tokio::test]
async fn test_create_session_inviting_addresses() {
    let (endpoint, agent) = alice();

    let session = endpoint
        .create_session(vec!["bob@twil.io", "charles@twil.io"])
        .unwrap()
        .await
        .unwrap();

    assert_eq!(session.len(), 3);
    assert_eq!(addresses(&session), set(&[ALICE, "bob@twil.io", "charles@twil.io"]));
    assert_eq!(agent.invites_sent().len(), 2);
}

#[tokio::test]
async fn test_rejected_invite_does_not_fail_session() {
    let (endpoint, agent) = alice();
    agent.reject("bob@x", RejectReason::busy()).unwrap();

    let summary = endpoint
        .create_session(["bob@x", "charlie@x"])
        .unwrap()
        .outcome()
        .await
        .unwrap();

    assert_eq!(addresses(&summary.session), set(&[ALICE, "charlie@x"]));
    assert_eq!(summary.invites[0].status, InviteStatus::Rejected);
    assert_eq!(summary.invites[0].reject_reason, Some(RejectReason::busy()));
    assert_eq!(summary.invites[1].status, InviteStatus::Accepted);
}

#[tokio::test]
async fn test_all_rejected_still_resolves() {
    let (endpoint, agent) = alice();
    agent.reject("bob@x", RejectReason::declined()).unwrap();
    agent.reject("charlie@x", RejectReason::transport("connection refused")).unwrap();

    let session = endpoint
        .create_session(["bob@x", "charlie@x"])
        .unwrap()
        .await
        .unwrap();

    assert_eq!(addresses(&session), set(&[ALICE]));
}

#[tokio::test]
async fn test_create_session_inviting_endpoints() {
    let (endpoint, _) = alice();
    let (bob, _) = endpoint_with("bob@twil.io");
    let (charles, _) = endpoint_with("charles@twil.io");

    let session = endpoint
        .create_session(vec![InviteTarget::from(&bob), InviteTarget::from(&charles)])
        .unwrap()
        .await
        .unwrap();

    assert_eq!(addresses(&session), set(&[ALICE, "bob@twil.io", "charles@twil.io"]));
}

#[tokio::test]
async fn test_create_session_inviting_participants() {
    let (endpoint, _) = alice();
    let participants = vec![
        Participant::new("bob@twil.io").unwrap(),
        Participant::new("charles@twil.io").unwrap(),
    ];

    let session = endpoint.create_session(participants.clone()).unwrap().await.unwrap();

    for participant in &participants {
        assert!(session.contains(participant.identity()));
    }
    assert_eq!(session.len(), 3);
}

#[tokio::test]
async fn test_create_session_inviting_mixed_targets() {
    let (endpoint, agent) = alice();
    let (same_alice, _) = alice();
    let targets = vec![
        InviteTarget::from(&same_alice),
        InviteTarget::from("bob@twil.io"),
        InviteTarget::from(Participant::new("charles@twil.io").unwrap()),
        InviteTarget::from("sip:bob@twil.io"),
    ];

    let session = endpoint.create_session(targets).unwrap().await.unwrap();

    assert_eq!(addresses(&session), set(&[ALICE, "bob@twil.io", "charles@twil.io"]));
    // duplicates and the initiator itself are never dispatched
    assert_eq!(agent.invites_sent().len(), 2);
}

#[tokio::test]
async fn test_invalid_target_fails_before_dispatch() {
    let (endpoint, agent) = alice();

    let err = endpoint
        .create_session(["bob@x", "definitely not an address"])
        .err()
        .unwrap();

    assert_eq!(err, ConferenceError::invalid_target("definitely not an address"));
    assert!(agent.invites_sent().is_empty());
    assert!(endpoint.store().is_empty());
}

#[tokio::test]
async fn test_membership_matches_resolved_targets() {
    let target_lists: Vec<Vec<&str>> = vec![
        vec!["bob@x"],
        vec!["bob@x", "bob@x", "carol@x"],
        vec!["carol@x", "dave@x", "erin@x", "frank@x"],
        vec![ALICE, "dave@x"],
    ];

    for targets in target_lists {
        let (endpoint, _) = alice();
        let mut expected = set(&targets);
        expected.insert(ALICE.to_string());

        let session = endpoint.create_session(targets).unwrap().await.unwrap();
        assert_eq!(addresses(&session), expected);
    }
}

#[tokio::test]
async fn test_invites_are_outstanding_concurrently() {
    let (endpoint, agent) = alice();
    for address in ["bob@x", "charlie@x", "dave@x"] {
        agent.park(address).unwrap();
    }

    let pending = endpoint.create_session(["bob@x", "charlie@x", "dave@x"]).unwrap();
    agent.wait_for_invites(3).await;

    // every invite is in flight while none has settled
    assert_eq!(pending.session().len(), 1);
    assert_eq!(endpoint.coordinator().outstanding_count(), 3);

    // settle out of order
    agent.release("dave@x", Ok(())).unwrap();
    agent.release("bob@x", Err(RejectReason::timeout())).unwrap();
    agent.release("charlie@x", Ok(())).unwrap();

    let session = pending.await.unwrap();
    assert_eq!(addresses(&session), set(&[ALICE, "charlie@x", "dave@x"]));
    assert_eq!(endpoint.coordinator().outstanding_count(), 0);
}

#[tokio::test]
async fn test_join_bare_session() {
    let (endpoint, agent) = alice();
    let session = Arc::new(Session::new());
    assert_eq!(session.state(), SessionState::Pending);
    let mut events = session.subscribe();

    let joined = endpoint.join(&session).unwrap().await.unwrap();

    assert!(Arc::ptr_eq(&joined, &session));
    assert_eq!(addresses(&session), set(&[ALICE]));
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(
        event_log(events.drain()),
        vec![(EventKind::ParticipantJoined, ALICE.to_string())]
    );
    assert_eq!(agent.invites_sent().len(), 1);
    assert!(endpoint.store().contains(session.id()));
}

#[tokio::test]
async fn test_join_when_already_member_is_silent() {
    let (endpoint, agent) = alice();
    let session = endpoint.create_session("bob@x").unwrap().await.unwrap();
    let mut events = session.subscribe();

    let summary = endpoint.join(&session).unwrap().outcome().await.unwrap();

    assert!(summary.invites.is_empty());
    assert_eq!(session.len(), 2);
    assert!(events.drain().is_empty());
    // only bob was ever invited
    assert_eq!(agent.invites_sent().len(), 1);
}

#[tokio::test]
async fn test_rejected_join_is_not_registered() {
    let (endpoint, agent) = alice();
    agent.reject(ALICE, RejectReason::declined()).unwrap();
    let session = Arc::new(Session::new());
    session.add_participant(Participant::new("bob@x").unwrap()).unwrap();

    let summary = endpoint.join(&session).unwrap().outcome().await.unwrap();

    assert_eq!(summary.invites[0].status, InviteStatus::Rejected);
    assert!(!session.contains(endpoint.identity()));
    assert!(!endpoint.store().contains(session.id()));
    assert_eq!(endpoint.store().stats().total_created, 0);
}

#[tokio::test]
async fn test_join_ended_session_fails() {
    let (endpoint, agent) = alice();
    let session = Arc::new(Session::new());
    session.end();

    let err = endpoint.join(&session).err().unwrap();
    assert_eq!(err, ConferenceError::session_ended(session.id()));
    assert!(agent.invites_sent().is_empty());
}

#[tokio::test]
#[traced_test]
async fn test_leave_after_create() {
    let (endpoint, agent) = alice();
    let (bob, _) = endpoint_with("bob@twil.io");
    let session = endpoint.create_session(&bob).unwrap().await.unwrap();
    let mut left = session.subscribe_kind(EventKind::ParticipantLeft);

    assert!(endpoint.leave(&session).await.unwrap());

    assert_eq!(addresses(&session), set(&["bob@twil.io"]));
    assert_eq!(
        event_log(left.drain()),
        vec![(EventKind::ParticipantLeft, ALICE.to_string())]
    );
    assert_eq!(
        agent.leaves_sent(),
        vec![(session.id().clone(), Identity::parse(ALICE).unwrap())]
    );
}

#[tokio::test]
async fn test_join_then_leave_fires_one_event_each() {
    let (endpoint, _) = alice();
    let session = Arc::new(Session::new());
    session.add_participant(Participant::new("bob@x").unwrap()).unwrap();
    let mut events = session.subscribe();

    endpoint.join(&session).unwrap().await.unwrap();
    assert!(endpoint.leave(&session).await.unwrap());
    assert!(!endpoint.leave(&session).await.unwrap());

    assert!(!session.contains(endpoint.identity()));
    assert_eq!(
        event_log(events.drain()),
        vec![
            (EventKind::ParticipantJoined, ALICE.to_string()),
            (EventKind::ParticipantLeft, ALICE.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_leave_before_join_settles_cancels_invite() {
    let (endpoint, agent) = alice();
    agent.park(ALICE).unwrap();
    let session = Arc::new(Session::new());
    session.add_participant(Participant::new("bob@x").unwrap()).unwrap();
    let mut events = session.subscribe();

    let pending = endpoint.join(&session).unwrap();
    agent.wait_for_invites(1).await;
    assert!(endpoint.leave(&session).await.unwrap());

    // the late accept must not resurrect membership
    agent.release(ALICE, Ok(())).unwrap();
    let summary = pending.outcome().await.unwrap();

    assert_eq!(summary.invites[0].status, InviteStatus::Cancelled);
    assert!(!session.contains(endpoint.identity()));
    assert!(events.drain().is_empty());
}

#[tokio::test]
async fn test_double_join_then_leave_stays_out() {
    let (endpoint, agent) = alice();
    agent.park(ALICE).unwrap();
    let session = Arc::new(Session::new());
    session.add_participant(Participant::new("bob@x").unwrap()).unwrap();
    let mut events = session.subscribe();

    let first = endpoint.join(&session).unwrap();
    let second = endpoint.join(&session).unwrap();
    agent.wait_for_invites(2).await;
    assert!(endpoint.leave(&session).await.unwrap());

    assert_eq!(agent.release(ALICE, Ok(())).unwrap(), 2);
    for pending in [first, second] {
        let summary = pending.outcome().await.unwrap();
        assert_eq!(summary.invites[0].status, InviteStatus::Cancelled);
    }

    assert!(!session.contains(endpoint.identity()));
    assert!(events.drain().is_empty());
    assert!(!endpoint.store().contains(session.id()));
}

#[tokio::test]
async fn test_leave_immediately_after_join() {
    let (endpoint, _) = alice();
    let session = Arc::new(Session::new());
    session.add_participant(Participant::new("bob@x").unwrap()).unwrap();

    let pending = endpoint.join(&session).unwrap();
    assert!(endpoint.leave(&session).await.unwrap());
    let summary = pending.outcome().await.unwrap();

    assert_eq!(summary.invites[0].status, InviteStatus::Cancelled);
    assert!(!session.contains(endpoint.identity()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_leave_racing_late_accept_never_readmits() {
    for _ in 0..64 {
        let (endpoint, agent) = alice();
        agent.park(ALICE).unwrap();
        let session = Arc::new(Session::new());
        session.add_participant(Participant::new("bob@x").unwrap()).unwrap();

        let pending = endpoint.join(&session).unwrap();
        agent.wait_for_invites(1).await;

        let releaser = {
            let agent = agent.clone();
            tokio::spawn(async move { agent.release(ALICE, Ok(())).unwrap() })
        };
        endpoint.leave(&session).await.unwrap();
        releaser.await.unwrap();
        pending.outcome().await.unwrap();

        assert!(!session.contains(endpoint.identity()));
    }
}

#[tokio::test]
async fn test_last_leave_ends_session_and_unregisters() {
    let (endpoint, _) = alice();
    let session = endpoint.create_session(Vec::<&str>::new()).unwrap().await.unwrap();

    endpoint.leave(&session).await.unwrap();

    assert_eq!(session.state(), SessionState::Ended);
    assert!(!endpoint.store().contains(session.id()));
    assert!(matches!(
        session.add_participant(Participant::new("bob@x").unwrap()),
        Err(ConferenceError::SessionEnded { .. })
    ));
}

#[tokio::test]
async fn test_end_session_removes_everyone() {
    let (endpoint, agent) = alice();
    let session = endpoint
        .create_session(["bob@x", "charlie@x"])
        .unwrap()
        .await
        .unwrap();
    let mut left = session.subscribe_kind(EventKind::ParticipantLeft);

    endpoint.end_session(&session).await.unwrap();
    endpoint.end_session(&session).await.unwrap();

    assert_eq!(session.state(), SessionState::Ended);
    assert_eq!(left.drain().len(), 3);
    assert!(endpoint.store().is_empty());
    assert_eq!(agent.leaves_sent().len(), 1);
}

#[tokio::test]
async fn test_endpoints_sharing_a_store() {
    let store = Arc::new(SessionStore::new());
    let agent = Arc::new(LoopbackUserAgent::new());
    let alice = Endpoint::builder()
        .address(ALICE)
        .user_agent(agent.clone())
        .store(store.clone())
        .build()
        .unwrap();
    let bob = Endpoint::builder()
        .address("bob@twil.io")
        .user_agent(agent)
        .store(store.clone())
        .build()
        .unwrap();

    let session = alice.create_session(Vec::<&str>::new()).unwrap().await.unwrap();
    let shared = bob.store().get(session.id()).unwrap();
    bob.join(&shared).unwrap().await.unwrap();

    assert_eq!(addresses(&session), set(&[ALICE, "bob@twil.io"]));
    assert_eq!(store.stats().total_created, 1);
}
