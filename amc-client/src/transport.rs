//! Transport interface and per-transport configuration.

use crate::config::ClosePolicy;
use crate::error::ClientError;
use bytes::Bytes;
use std::time::Duration;

/// Default timeout for a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on the drain performed when a transport is dropped.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// An outbound message transport.
///
/// `send` never blocks and never reports network failures; those are logged
/// by the worker and show up as `drain` returning.
pub trait Transport: Send + Sync {
    /// Queues `message` for transmission, starting the worker if needed.
    fn send(&self, message: Bytes) -> Result<(), ClientError>;

    /// Blocks until everything queued so far has been written or dropped.
    fn drain(&self);

    /// Like `drain`, bounded by `timeout`. Returns `true` if drained.
    fn drain_timeout(&self, timeout: Duration) -> bool;

    /// Stops the worker, discarding anything still queued.
    fn close(&self);
}

/// Destination and lifecycle settings for one transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Host name or IP address of the server.
    pub host: String,
    /// Destination port.
    pub port: u16,
    /// Timeout for each connection attempt (stream transport only).
    pub connect_timeout: Duration,
    /// What to do when the transport is dropped.
    pub close_policy: ClosePolicy,
    /// Bound on the drain performed on drop.
    pub drain_timeout: Duration,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_policy: ClosePolicy::DrainFirst,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
