//! Error types for conference operations

use thiserror::Error;

use crate::types::{Identity, RejectReason, SessionId};

/// Result type for conference operations
pub type ConferenceResult<T> = Result<T, ConferenceError>;

/// Errors that can occur while building or driving a conference session
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConferenceError {
    /// An invite target could not be resolved to an identity
    #[error("Invalid invite target: {value}")]
    InvalidTarget { value: String },

    /// Mutation attempted on a session that has already ended
    #[error("Session {session_id} has ended")]
    SessionEnded { session_id: SessionId },

    /// The remote side rejected an invite
    #[error("Invite to {identity} rejected: {reason}")]
    InviteRejected {
        identity: Identity,
        reason: RejectReason,
    },

    /// The invite was cancelled locally before it settled
    #[error("Invite to {identity} was cancelled")]
    InviteCancelled { identity: Identity },

    /// Credential provider failed to supply an address
    #[error("Credentials error: {message}")]
    Credentials { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Signaling transport failure
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ConferenceError {
    /// Create an invalid target error naming the offending value
    pub fn invalid_target(value: impl Into<String>) -> Self {
        Self::InvalidTarget {
            value: value.into(),
        }
    }

    /// Create a session ended error
    pub fn session_ended(session_id: &SessionId) -> Self {
        Self::SessionEnded {
            session_id: session_id.clone(),
        }
    }

    /// Create an invite rejected error
    pub fn invite_rejected(identity: &Identity, reason: RejectReason) -> Self {
        Self::InviteRejected {
            identity: identity.clone(),
            reason,
        }
    }

    /// Create a credentials error
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure is confined to a single invite.
    ///
    /// Per-invite failures are absorbed by the fan-out; everything else is
    /// a caller or setup error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InviteRejected { .. } | Self::InviteCancelled { .. } | Self::Transport { .. }
        )
    }
}
