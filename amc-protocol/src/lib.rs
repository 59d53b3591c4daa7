//! # amc-protocol
//!
//! Open Sound Control wire format for amc.
//!
//! This crate provides:
//! - OSC message encoding with typed arguments
//! - Length-prefixed framing for stream transports
//! - Size-bounded bundles for datagram transports
//! - Protocol constants

pub mod bundle;
pub mod codec;
pub mod error;
pub mod frame;

pub use bundle::{Bundle, BUNDLE_HEADER_SIZE, BUNDLE_MAGIC};
pub use codec::{encode, encoded_size, Argument, Message};
pub use error::ProtocolError;
pub use frame::{length_prefixed, LENGTH_PREFIX_SIZE};

/// Every OSC section is padded to this many bytes.
pub const ALIGNMENT: usize = 4;

/// Largest datagram a bundle may grow to.
pub const MAX_PACKET_SIZE: usize = 1500;

/// Default Asset Manager TCP port.
pub const DEFAULT_STREAM_PORT: u16 = 15002;

/// Default Asset Manager UDP port.
pub const DEFAULT_DATAGRAM_PORT: u16 = 15003;
