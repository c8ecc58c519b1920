//! Credential seam
//!
//! Token issuance and validation live outside this crate. An endpoint only
//! needs the authenticated address, read once when it is constructed.

use crate::errors::{ConferenceError, ConferenceResult};

/// Supplies the authenticated address of the local endpoint
pub trait CredentialProvider: Send + Sync {
    fn address(&self) -> ConferenceResult<String>;
}

/// A fixed, already-authenticated address
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    address: String,
}

impl StaticCredentials {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn address(&self) -> ConferenceResult<String> {
        if self.address.trim().is_empty() {
            return Err(ConferenceError::credentials("no address in credentials"));
        }
        Ok(self.address.clone())
    }
}
