//! High-level Asset Manager control API.

use crate::barrier::ConnectionState;
use crate::config::{ClientConfig, ClosePolicy, CoreTransport};
use crate::datagram::DatagramTransport;
use crate::error::ClientError;
use crate::stream::StreamTransport;
use amc_protocol::{Argument, Bundle, Message};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Client for one Asset Manager project.
///
/// Owns a stream and a datagram transport. Built-in control messages go out
/// on the core transport selected by [`ClientConfig::core_transport`].
pub struct Client {
    config: ClientConfig,
    stream: StreamTransport,
    datagram: DatagramTransport,
    /// Open datagram bundle, if any.
    bundle: Mutex<Option<Bundle>>,
    closed: AtomicBool,
}

impl Client {
    /// Creates a client. No connection is made until the first message.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            stream: StreamTransport::new(config.stream_transport()),
            datagram: DatagramTransport::new(config.datagram_transport()),
            config,
            bundle: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the base OSC address of the project.
    pub fn base_address(&self) -> &str {
        &self.config.base_address
    }

    /// Returns the connection state of the stream transport.
    pub fn stream_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn stream(&self) -> &StreamTransport {
        &self.stream
    }

    pub fn datagram(&self) -> &DatagramTransport {
        &self.datagram
    }

    // =========================================================================
    // System operations
    // =========================================================================

    /// Mutes or unmutes the Asset Manager output.
    pub fn set_system_mute(&self, mute: bool) -> Result<(), ClientError> {
        self.send_core(Message::new("/AM/Mute").with_arg(mute_flag(mute)))
    }

    /// Sets the master volume. `volume` is linear in `[0, 1]`; values
    /// outside that range are ignored.
    pub fn set_system_volume(&self, volume: f32) -> Result<(), ClientError> {
        let Some(db) = to_decibels(volume) else {
            tracing::warn!("Ignoring system volume {} outside [0, 1]", volume);
            return Ok(());
        };
        self.send_core(Message::new("/AM/Volume").with_arg(db))
    }

    // =========================================================================
    // Project operations
    // =========================================================================

    /// Loads the project.
    pub fn load(&self) -> Result<(), ClientError> {
        self.send_core(Message::new("/AM/Load").with_arg(self.base_address()))
    }

    /// Unloads the project.
    pub fn unload(&self) -> Result<(), ClientError> {
        self.send_core(Message::new("/AM/Unload").with_arg(self.base_address()))
    }

    /// Mutes or unmutes the project.
    pub fn set_mute(&self, mute: bool) -> Result<(), ClientError> {
        self.send_core(
            Message::new("/AM/Project/Mute")
                .with_arg(self.base_address())
                .with_arg(mute_flag(mute)),
        )
    }

    /// Sets the project volume. Same range rules as
    /// [`set_system_volume`](Self::set_system_volume).
    pub fn set_volume(&self, volume: f32) -> Result<(), ClientError> {
        let Some(db) = to_decibels(volume) else {
            tracing::warn!("Ignoring project volume {} outside [0, 1]", volume);
            return Ok(());
        };
        self.send_core(
            Message::new("/AM/Project/Volume")
                .with_arg(self.base_address())
                .with_arg(db),
        )
    }

    // =========================================================================
    // Custom messages
    // =========================================================================

    /// Sends `url` (appended to the base address) over the stream transport.
    pub fn send_custom_stream(&self, url: &str, args: &[Argument]) -> Result<(), ClientError> {
        let message = amc_protocol::encode(&self.custom_address(url), args)?;
        self.stream.send(message)
    }

    /// Sends `url` (appended to the base address) over the datagram
    /// transport, joining the open bundle if there is one.
    pub fn send_custom_datagram(&self, url: &str, args: &[Argument]) -> Result<(), ClientError> {
        let message = amc_protocol::encode(&self.custom_address(url), args)?;
        self.send_datagram(message)
    }

    fn custom_address(&self, url: &str) -> String {
        format!("{}{}", self.config.base_address, url)
    }

    // =========================================================================
    // Bundles
    // =========================================================================

    /// Starts collecting datagram messages into a bundle.
    ///
    /// A bundle that is already open is sent first.
    pub fn start_bundle(&self) -> Result<(), ClientError> {
        let mut bundle = self.bundle.lock();
        if let Some(open) = bundle.take() {
            self.send_bundle(open)?;
        }
        *bundle = Some(Bundle::open());
        Ok(())
    }

    /// Sends the open bundle. Does nothing if no bundle is open or it is
    /// empty.
    pub fn end_bundle(&self) -> Result<(), ClientError> {
        match self.bundle.lock().take() {
            Some(open) => self.send_bundle(open),
            None => Ok(()),
        }
    }

    /// Returns whether a bundle is open.
    pub fn bundle_open(&self) -> bool {
        self.bundle.lock().is_some()
    }

    fn send_bundle(&self, bundle: Bundle) -> Result<(), ClientError> {
        match bundle.close() {
            Some(packet) => self.datagram.send(packet),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Blocks until both transports have nothing left to send.
    pub fn drain(&self) {
        self.stream.drain();
        self.datagram.drain();
    }

    /// Closes the client according to its close configuration.
    ///
    /// Sends the open bundle and, if configured, an unload message, then
    /// drains (bounded) and closes both transports. The unload message is
    /// only sent by the first call.
    pub fn close(&self) {
        let first = !self.closed.swap(true, Ordering::SeqCst);

        if let Err(e) = self.end_bundle() {
            tracing::warn!("Failed to send open bundle on close: {}", e);
        }
        if first && self.config.on_close.unload {
            if let Err(e) = self.unload() {
                tracing::warn!("Failed to send unload on close: {}", e);
            }
        }

        if self.config.on_close.policy == ClosePolicy::DrainFirst {
            let timeout = self.config.on_close.drain_timeout();
            let stream_drained = self.stream.drain_timeout(timeout);
            let datagram_drained = self.datagram.drain_timeout(timeout);
            if !stream_drained || !datagram_drained {
                tracing::warn!("Timed out draining before close");
            }
        }

        self.stream.close();
        self.datagram.close();
        tracing::debug!("Client for '{}' closed", self.config.base_address);
    }

    // =========================================================================
    // Helper methods
    // =========================================================================

    fn send_core(&self, message: Message) -> Result<(), ClientError> {
        let encoded = message.encode()?;
        match self.config.core_transport {
            CoreTransport::Stream => self.stream.send(encoded),
            CoreTransport::Datagram => self.send_datagram(encoded),
        }
    }

    fn send_datagram(&self, message: Bytes) -> Result<(), ClientError> {
        let mut bundle = self.bundle.lock();
        match bundle.as_mut() {
            Some(open) => match open.append(&message) {
                Some(full) => self.datagram.send(full),
                None => Ok(()),
            },
            None => self.datagram.send(message),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn mute_flag(mute: bool) -> i32 {
    if mute {
        1
    } else {
        0
    }
}

/// Converts a linear gain in `[0, 1]` to decibels.
fn to_decibels(volume: f32) -> Option<f32> {
    (0.0..=1.0)
        .contains(&volume)
        .then(|| 20.0 * volume.log10())
}
