//! Session configuration.

use std::time::Duration;

use super::backoff::BackoffConfig;
use crate::core::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT};

/// Tunables for a [`Session`](super::Session).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// How long a single connect may take.
    pub connect_timeout: Duration,

    /// How long the admission handshake may take.
    pub handshake_timeout: Duration,

    /// Reconnect delay policy.
    pub backoff: BackoffConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            backoff: BackoffConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}
