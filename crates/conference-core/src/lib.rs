//! # Conference Core - Multi-party Session Membership for RVoIP
//!
//! This crate tracks who is in a multi-party call and coordinates the
//! invites that put them there. Signaling itself is delegated to a
//! [`UserAgent`] implementation; media and credentials are out of scope.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────┐
//! │          Endpoint           │  create_session / join / leave
//! └──────┬───────────────┬──────┘
//!        │               │
//! ┌──────▼──────┐ ┌──────▼──────────────┐
//! │  Identity   │ │  Invite Coordinator │──► UserAgent (signaling)
//! │  Resolver   │ └──────┬──────────────┘
//! └─────────────┘        │ add / remove
//!                 ┌──────▼──────┐    ┌───────────┐
//!                 │   Session   │───►│ Event Bus │──► subscribers
//!                 └─────────────┘    └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rvoip_conference_core::{Endpoint, EventKind, LoopbackUserAgent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = Endpoint::builder()
//!         .address("alice@example.com")
//!         .user_agent(Arc::new(LoopbackUserAgent::new()))
//!         .build()?;
//!
//!     let pending = endpoint.create_session(["bob@example.com", "charlie@example.com"])?;
//!     let mut joins = pending.session().subscribe_kind(EventKind::ParticipantJoined);
//!
//!     let session = pending.await?;
//!     while let Some(event) = joins.try_recv() {
//!         println!("joined: {}", event.participant());
//!     }
//!     println!("{} participants", session.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Failure model
//!
//! - An invalid invite target fails `create_session` before anything is sent.
//! - A rejected invite never fails the aggregate; the session simply ends up
//!   with fewer members. [`PendingSession::outcome`] reports each invite.
//! - Mutating an ended session fails with [`ConferenceError::SessionEnded`].

pub mod builder;
pub mod config;
pub mod coordinator;
pub mod credentials;
pub mod endpoint;
pub mod errors;
pub mod events;
pub mod identity;
pub mod session;
pub mod store;
pub mod types;
pub mod user_agent;

pub use builder::EndpointBuilder;
pub use config::EndpointConfig;
pub use coordinator::{InviteCoordinator, InviteSummary, PendingSession};
pub use credentials::{CredentialProvider, StaticCredentials};
pub use endpoint::Endpoint;
pub use errors::{ConferenceError, ConferenceResult};
pub use events::{EventBus, EventKind, EventSubscriber, SessionEvent};
pub use identity::{IdentityResolver, InviteTarget};
pub use session::Session;
pub use store::{SessionStore, SessionStoreStats};
pub use types::{
    ConnectionState, Identity, InviteRequest, InviteStatus, Participant, ParticipantHandle,
    ParticipantKind, RejectReason, SessionId, SessionState,
};
pub use user_agent::{InboundSignal, InviteRule, LoopbackUserAgent, UserAgent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
