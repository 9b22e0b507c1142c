//! Typed request/response relay between the in-page agent and the privileged agent
//!
//! The two contexts share no memory. Each direction is an [`Endpoint`]: the
//! receiving context installs a [`Handler`], the sending context posts
//! [`Request`]s and awaits exactly one [`Response`] or a [`RelayError`]. Delivery
//! is at-most-once; retries are the analysis dispatcher's business, not the
//! transport's.

pub mod channel;
pub mod message;

pub use channel::{Endpoint, Handler};
pub use message::{Request, Response};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts applied by an [`Endpoint`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Upper bound on the `checkIfLoaded` readiness probe
    pub probe_timeout: Duration,

    /// Upper bound on waiting for any other reply
    pub response_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { probe_timeout: Duration::from_secs(1), response_timeout: Duration::from_secs(120) }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}
