//! # amc-client
//!
//! Client library for controlling an Asset Manager over Open Sound Control.
//!
//! This crate provides:
//! - A reliable TCP transport with length-prefixed framing
//! - A best-effort UDP transport
//! - Non-blocking sends backed by one worker thread per transport
//! - A drain barrier to wait for queued messages
//! - A high-level API for project and system control

pub mod barrier;
pub mod client;
pub mod config;
pub mod datagram;
pub mod error;
pub mod stream;
pub mod transport;
mod worker;

pub use barrier::{ConnectionState, DrainBarrier};
pub use client::Client;
pub use config::{ClientConfig, CloseConfig, ClosePolicy, ConfigError, CoreTransport};
pub use datagram::DatagramTransport;
pub use error::ClientError;
pub use stream::StreamTransport;
pub use transport::{Transport, TransportConfig};
