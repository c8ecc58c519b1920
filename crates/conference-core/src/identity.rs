//! Invite target resolution
//!
//! Callers can invite a bare address, another local [`Endpoint`], an
//! existing [`Participant`], or a list mixing any of these. All of them are
//! folded into [`InviteTarget`] at the API boundary and resolved exactly once
//! into an ordered, deduplicated list of [`Identity`] values. Nothing past
//! this module branches on the shape of the original input.
//!
//! ```rust
//! use rvoip_conference_core::{IdentityResolver, InviteTarget, Participant};
//!
//! let targets = InviteTarget::from(vec![
//!     InviteTarget::from("bob@example.com"),
//!     InviteTarget::from(Participant::new("charlie@example.com").unwrap()),
//!     InviteTarget::from("sip:bob@example.com"),
//! ]);
//! let identities = IdentityResolver::resolve(&targets).unwrap();
//! assert_eq!(identities.len(), 2);
//! ```

use std::collections::HashSet;

use crate::endpoint::Endpoint;
use crate::errors::{ConferenceError, ConferenceResult};
use crate::types::{Identity, Participant};

/// Anything that can be invited into a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteTarget {
    /// A bare address such as `bob@example.com`
    Address(String),
    /// Another endpoint, represented by its local participant
    Endpoint(Participant),
    /// An already-resolved participant
    Participant(Participant),
    /// A list of targets, flattened one level
    Many(Vec<InviteTarget>),
    /// Nothing to invite
    None,
}

impl From<&str> for InviteTarget {
    fn from(address: &str) -> Self {
        Self::Address(address.to_string())
    }
}

impl From<String> for InviteTarget {
    fn from(address: String) -> Self {
        Self::Address(address)
    }
}

impl From<&Endpoint> for InviteTarget {
    fn from(endpoint: &Endpoint) -> Self {
        Self::Endpoint(endpoint.local_participant().clone())
    }
}

impl From<Participant> for InviteTarget {
    fn from(participant: Participant) -> Self {
        Self::Participant(participant)
    }
}

impl From<&Participant> for InviteTarget {
    fn from(participant: &Participant) -> Self {
        Self::Participant(participant.clone())
    }
}

impl<T: Into<InviteTarget>> From<Vec<T>> for InviteTarget {
    fn from(targets: Vec<T>) -> Self {
        Self::Many(targets.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<InviteTarget>, const N: usize> From<[T; N]> for InviteTarget {
    fn from(targets: [T; N]) -> Self {
        Self::Many(targets.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<InviteTarget>> From<Option<T>> for InviteTarget {
    fn from(target: Option<T>) -> Self {
        target.map_or(Self::None, Into::into)
    }
}

/// Stateless resolver from [`InviteTarget`] to canonical identities
pub struct IdentityResolver;

impl IdentityResolver {
    /// Resolve a target into identities, first occurrence wins.
    ///
    /// Fails with `InvalidTarget` on an unparseable address or on a list
    /// nested inside another list.
    pub fn resolve(target: &InviteTarget) -> ConferenceResult<Vec<Identity>> {
        let mut resolved = Vec::new();
        let mut seen = HashSet::new();

        match target {
            InviteTarget::Many(targets) => {
                for target in targets {
                    Self::push_single(target, &mut resolved, &mut seen)?;
                }
            }
            single => Self::push_single(single, &mut resolved, &mut seen)?,
        }

        Ok(resolved)
    }

    fn push_single(
        target: &InviteTarget,
        resolved: &mut Vec<Identity>,
        seen: &mut HashSet<Identity>,
    ) -> ConferenceResult<()> {
        let identity = match target {
            InviteTarget::Address(address) => Identity::parse(address)?,
            InviteTarget::Endpoint(participant) | InviteTarget::Participant(participant) => {
                participant.identity().clone()
            }
            InviteTarget::None => return Ok(()),
            InviteTarget::Many(_) => {
                return Err(ConferenceError::invalid_target(format!("{:?}", target)));
            }
        };

        if seen.insert(identity.clone()) {
            resolved.push(identity);
        }
        Ok(())
    }
}
