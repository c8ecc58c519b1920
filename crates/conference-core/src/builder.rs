//! Fluent construction of endpoints
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_conference_core::{EndpointBuilder, LoopbackUserAgent, SessionStore};
//!
//! let store = Arc::new(SessionStore::new());
//! let endpoint = EndpointBuilder::new()
//!     .address("alice@example.com")
//!     .user_agent(Arc::new(LoopbackUserAgent::new()))
//!     .store(store.clone())
//!     .event_capacity(32)
//!     .build()
//!     .expect("endpoint");
//!
//! assert_eq!(endpoint.address(), "alice@example.com");
//! assert!(Arc::ptr_eq(endpoint.store(), &store));
//! ```

use std::sync::Arc;

use crate::config::EndpointConfig;
use crate::credentials::{CredentialProvider, StaticCredentials};
use crate::endpoint::Endpoint;
use crate::errors::{ConferenceError, ConferenceResult};
use crate::store::SessionStore;
use crate::user_agent::UserAgent;

/// Builder for [`Endpoint`]
///
/// Credentials and a user agent are required. Without an explicit store
/// the endpoint gets a private one.
#[derive(Default)]
pub struct EndpointBuilder {
    credentials: Option<Box<dyn CredentialProvider>>,
    user_agent: Option<Arc<dyn UserAgent>>,
    store: Option<Arc<SessionStore>>,
    config: EndpointConfig,
}

impl EndpointBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed, already-authenticated address
    pub fn address(self, address: impl Into<String>) -> Self {
        self.credentials(StaticCredentials::new(address))
    }

    pub fn credentials(mut self, credentials: impl CredentialProvider + 'static) -> Self {
        self.credentials = Some(Box::new(credentials));
        self
    }

    pub fn user_agent(mut self, user_agent: Arc<dyn UserAgent>) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    /// Share a session store with other endpoints
    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(mut self, config: EndpointConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn accept_inbound(mut self, accept: bool) -> Self {
        self.config.accept_inbound = accept;
        self
    }

    pub fn build(self) -> ConferenceResult<Endpoint> {
        let credentials = self
            .credentials
            .ok_or_else(|| ConferenceError::config("credentials are required"))?;
        let user_agent = self
            .user_agent
            .ok_or_else(|| ConferenceError::config("a user agent is required"))?;
        let store = self.store.unwrap_or_default();

        Endpoint::new(credentials.as_ref(), user_agent, store, self.config)
    }
}
