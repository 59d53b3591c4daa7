//! Client error types.

use crate::config::ConfigError;
use amc_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
///
/// Network failures are not reported here: transports log them and recover
/// on the next send.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("failed to start transport worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether retrying the same call can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::WorkerSpawn(_))
    }
}
