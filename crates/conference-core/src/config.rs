//! Endpoint configuration
//!
//! ```rust
//! use rvoip_conference_core::EndpointConfig;
//!
//! let config = EndpointConfig::new()
//!     .with_event_capacity(64)
//!     .with_accept_inbound(false);
//!
//! assert_eq!(config.event_capacity, 64);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{ConferenceError, ConferenceResult};
use crate::session::DEFAULT_EVENT_CAPACITY;

/// Settings for an [`Endpoint`](crate::Endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Buffered membership events per subscriber before it starts lagging
    pub event_capacity: usize,
    /// Accept inbound invites automatically
    pub accept_inbound: bool,
    /// Drop sessions from the store once they end
    pub end_empty_sessions: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            accept_inbound: true,
            end_empty_sessions: true,
        }
    }
}

impl EndpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_accept_inbound(mut self, accept: bool) -> Self {
        self.accept_inbound = accept;
        self
    }

    pub fn with_end_empty_sessions(mut self, enabled: bool) -> Self {
        self.end_empty_sessions = enabled;
        self
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> ConferenceResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConferenceError::config(format!("invalid endpoint config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConferenceResult<()> {
        if self.event_capacity == 0 {
            return Err(ConferenceError::config("event_capacity must be greater than zero"));
        }
        Ok(())
    }
}
