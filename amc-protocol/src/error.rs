//! Protocol error types.

use thiserror::Error;

/// Errors produced while building or encoding OSC messages.
///
/// These are programmer errors: a message that fails to encode is never
/// handed to a transport.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    #[error("invalid OSC address {0:?}: must start with '/'")]
    InvalidAddress(String),

    #[error("unsupported OSC type tag '{0}'")]
    UnsupportedType(char),

    #[error("string contains an embedded NUL byte")]
    EmbeddedNul,

    #[error("invalid value {value:?} for type tag '{tag}'")]
    InvalidArgument { tag: char, value: String },
}
