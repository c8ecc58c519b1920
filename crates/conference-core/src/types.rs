//! Core types for conference-core
//!
//! Identifiers, participants and the small state enums shared by the
//! session, coordinator and endpoint layers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{ConferenceError, ConferenceResult};

/// Unique identifier for a conference session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(format!("session-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Canonical deduplication key for a participant.
///
/// Two addresses that differ only in surrounding whitespace, a `sip:` or
/// `sips:` scheme prefix, or the case of the host part map to the same
/// identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Parse an address into its canonical identity
    pub fn parse(address: &str) -> ConferenceResult<Self> {
        let trimmed = address.trim();
        let bare = trimmed
            .strip_prefix("sips:")
            .or_else(|| trimmed.strip_prefix("sip:"))
            .unwrap_or(trimmed);

        if bare.is_empty() || bare.chars().any(char::is_whitespace) {
            return Err(ConferenceError::invalid_target(address));
        }

        let canonical = match bare.split_once('@') {
            Some((user, host)) => {
                if user.is_empty() || host.is_empty() || host.contains('@') {
                    return Err(ConferenceError::invalid_target(address));
                }
                format!("{}@{}", user, host.to_ascii_lowercase())
            }
            None => bare.to_string(),
        };

        Ok(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signaling state of a participant's connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Invited but not yet connected
    Pending,
    /// Member of a session
    Connected,
    /// Left or removed from a session
    Disconnected,
}

/// Whether a participant is backed by the local endpoint or an invited target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantKind {
    Local,
    Remote,
}

/// A party that is or was a member of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    address: String,
    identity: Identity,
    connection_state: ConnectionState,
    kind: ParticipantKind,
    joined_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// Create a remote participant from an address
    pub fn new(address: &str) -> ConferenceResult<Self> {
        Ok(Self::remote(Identity::parse(address)?))
    }

    /// Remote participant in the `Pending` state
    pub fn remote(identity: Identity) -> Self {
        Self::with_kind(identity, ParticipantKind::Remote)
    }

    /// Local participant backing an endpoint
    pub fn local(identity: Identity) -> Self {
        Self::with_kind(identity, ParticipantKind::Local)
    }

    fn with_kind(identity: Identity, kind: ParticipantKind) -> Self {
        Self {
            address: identity.as_str().to_string(),
            identity,
            connection_state: ConnectionState::Pending,
            kind,
            joined_at: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn kind(&self) -> ParticipantKind {
        self.kind
    }

    pub fn is_local(&self) -> bool {
        self.kind == ParticipantKind::Local
    }

    /// When the participant last joined a session
    pub fn joined_at(&self) -> Option<DateTime<Utc>> {
        self.joined_at
    }

    pub(crate) fn connected(mut self) -> Self {
        self.connection_state = ConnectionState::Connected;
        self.joined_at = Some(Utc::now());
        self
    }

    pub(crate) fn disconnected(mut self) -> Self {
        self.connection_state = ConnectionState::Disconnected;
        self
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Constructed without members
    Pending,
    /// Has at least one member
    Active,
    /// Terminated; no further mutation
    Ended,
}

/// Status of a single invite within a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteStatus {
    Outstanding,
    Accepted,
    Rejected,
    Cancelled,
}

impl InviteStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Outstanding)
    }
}

/// Why the remote side (or the transport) refused an invite
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RejectReason {
    /// SIP-style status code
    pub code: u16,
    pub reason: String,
}

impl RejectReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn busy() -> Self {
        Self::new(486, "Busy Here")
    }

    pub fn declined() -> Self {
        Self::new(603, "Decline")
    }

    pub fn unavailable() -> Self {
        Self::new(480, "Temporarily Unavailable")
    }

    pub fn timeout() -> Self {
        Self::new(408, "Request Timeout")
    }

    /// Transport failures are reported as rejections
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(503, message)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.reason)
    }
}

/// What the user agent hands back for an accepted invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantHandle {
    pub identity: Identity,
    /// Transport-level reference (dialog id or similar), if any
    pub dialog_id: Option<String>,
}

impl ParticipantHandle {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            dialog_id: None,
        }
    }

    pub fn with_dialog_id(mut self, dialog_id: impl Into<String>) -> Self {
        self.dialog_id = Some(dialog_id.into());
        self
    }
}

/// One invite and how it settled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRequest {
    pub target: Identity,
    pub status: InviteStatus,
    pub reject_reason: Option<RejectReason>,
}

impl InviteRequest {
    pub fn outstanding(target: Identity) -> Self {
        Self {
            target,
            status: InviteStatus::Outstanding,
            reject_reason: None,
        }
    }
}
