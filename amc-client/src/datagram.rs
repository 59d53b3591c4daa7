//! Best-effort transport over UDP.
//!
//! Each queued buffer becomes one datagram. Submission order is preserved
//! on the way out of the process; arrival order is not guaranteed.

use crate::barrier::{ConnectionState, DrainBarrier};
use crate::config::ClosePolicy;
use crate::error::ClientError;
use crate::transport::{Transport, TransportConfig};
use crate::worker::{self, Next, WorkerContext};
use bytes::Bytes;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};

/// A UDP client that sends OSC messages and bundles as datagrams.
pub struct DatagramTransport {
    config: TransportConfig,
    barrier: Arc<DrainBarrier>,
}

impl DatagramTransport {
    /// Creates a transport for `config`. No I/O happens until the first send.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            barrier: Arc::new(DrainBarrier::new()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns the drain barrier of this transport.
    pub fn barrier(&self) -> &DrainBarrier {
        &self.barrier
    }

    /// Returns whether a worker is currently running.
    pub fn is_running(&self) -> bool {
        self.barrier.lock().worker.is_some()
    }

    /// Queues `datagram`, starting the worker if none is running.
    pub fn send(&self, datagram: Bytes) -> Result<(), ClientError> {
        let mut state = self.barrier.lock();

        if let Some(signal) = state.worker.clone() {
            state.queue.push_back(datagram);
            signal.wake.notify_one();
            return Ok(());
        }

        let host = self.config.host.clone();
        let port = self.config.port;
        worker::start("amc-datagram", &self.barrier, &mut state, move |ctx| {
            run(ctx, host, port)
        })?;

        state.queue.push_back(datagram);
        Ok(())
    }

    /// Blocks until the queue is empty and no datagram is being sent.
    pub fn drain(&self) {
        self.barrier.wait();
    }

    /// Bounded [`drain`](Self::drain). Returns `true` if drained.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        self.barrier.wait_timeout(timeout)
    }

    /// Stops the worker and discards unsent datagrams.
    pub fn close(&self) {
        let handle = worker::stop(&mut self.barrier.lock());
        self.barrier.notify_idle();
        if let Some(handle) = handle {
            worker::join(handle);
            tracing::debug!(
                "Datagram transport to {}:{} closed",
                self.config.host,
                self.config.port
            );
        }
    }
}

impl Transport for DatagramTransport {
    fn send(&self, message: Bytes) -> Result<(), ClientError> {
        DatagramTransport::send(self, message)
    }

    fn drain(&self) {
        DatagramTransport::drain(self)
    }

    fn drain_timeout(&self, timeout: Duration) -> bool {
        DatagramTransport::drain_timeout(self, timeout)
    }

    fn close(&self) {
        DatagramTransport::close(self)
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        if self.config.close_policy == ClosePolicy::DrainFirst
            && !self.drain_timeout(self.config.drain_timeout)
        {
            tracing::warn!(
                "Timed out draining datagram transport to {}:{}",
                self.config.host,
                self.config.port
            );
        }
        self.close();
    }
}

async fn run(ctx: WorkerContext, host: String, port: u16) {
    let Some((socket, target)) = open(&ctx, &host, port).await else {
        return;
    };

    if !ctx.update(|state| state.state = ConnectionState::Connected) {
        return;
    }

    loop {
        match ctx.next_message() {
            Next::Stop => return,
            Next::Idle => {
                if !ctx.idle().await {
                    return;
                }
            }
            Next::Message(datagram) => {
                let sent = ctx.until_stopped(socket.send_to(&datagram, target)).await;
                match sent {
                    None => return,
                    Some(Ok(len)) => {
                        tracing::trace!("Sent {} byte datagram to {}", len, target);
                        if !ctx.complete_write() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Send to {} failed: {}", target, e);
                        ctx.finish(ConnectionState::Closed);
                        return;
                    }
                }
            }
        }
    }
}

/// Resolves the destination once and binds a local socket of the same
/// address family.
async fn open(ctx: &WorkerContext, host: &str, port: u16) -> Option<(UdpSocket, SocketAddr)> {
    let resolved = match ctx.until_stopped(lookup_host((host, port))).await? {
        Ok(mut addrs) => addrs.next(),
        Err(e) => {
            tracing::warn!("Failed to resolve {}:{}: {}", host, port, e);
            None
        }
    };
    let Some(target) = resolved else {
        ctx.finish(ConnectionState::Disconnected);
        return None;
    };

    let local: SocketAddr = if target.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    match ctx.until_stopped(UdpSocket::bind(local)).await? {
        Ok(socket) => {
            tracing::debug!("Sending datagrams to {}", target);
            Some((socket, target))
        }
        Err(e) => {
            tracing::warn!("Failed to bind UDP socket: {}", e);
            ctx.finish(ConnectionState::Disconnected);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_protocol::{encode, Argument, Bundle};

    fn receiver() -> (std::net::UdpSocket, u16) {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn recv(socket: &std::net::UdpSocket) -> Vec<u8> {
        let mut buf = [0u8; 2048];
        let len = socket.recv(&mut buf).unwrap();
        buf[..len].to_vec()
    }

    #[test]
    fn test_new_transport_is_idle() {
        let transport = DatagramTransport::new(TransportConfig::new("127.0.0.1", 9));
        assert!(!transport.is_running());
        assert!(transport.drain_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let transport = DatagramTransport::new(
            TransportConfig::new("127.0.0.1", 9).with_close_policy(ClosePolicy::CloseImmediately),
        );
        transport.close();
        transport.close();
        assert!(!transport.is_running());
        assert_eq!(transport.barrier().pending(), 0);
    }

    #[test]
    fn test_datagrams_delivered_in_order() {
        let (socket, port) = receiver();
        let transport = DatagramTransport::new(TransportConfig::new("127.0.0.1", port));

        let messages: Vec<Bytes> = (0..10)
            .map(|i| encode("/fader", &[Argument::Int32(i), Argument::Float32(0.5)]).unwrap())
            .collect();
        for message in &messages {
            transport.send(message.clone()).unwrap();
        }
        transport.drain();
        assert!(transport.is_running());

        // No length prefix on datagrams.
        for message in &messages {
            assert_eq!(recv(&socket), message.to_vec());
        }
    }

    #[test]
    fn test_bundle_sent_as_one_datagram() {
        let (socket, port) = receiver();
        let transport = DatagramTransport::new(TransportConfig::new("127.0.0.1", port));

        let mut bundle = Bundle::open();
        for i in 0..3 {
            let message = encode("/cue", &[Argument::Int32(i)]).unwrap();
            assert!(bundle.append(&message).is_none());
        }
        let packet = bundle.close().unwrap();
        transport.send(packet.clone()).unwrap();
        transport.drain();

        let received = recv(&socket);
        assert_eq!(received, packet.to_vec());
        assert_eq!(&received[..8], b"#bundle\0");
    }

    #[test]
    fn test_unresolvable_host_stops_worker() {
        let transport = DatagramTransport::new(
            TransportConfig::new("host.invalid", 15003)
                .with_close_policy(ClosePolicy::CloseImmediately),
        );
        transport.send(encode("/x", &[]).unwrap()).unwrap();
        assert!(transport.drain_timeout(Duration::from_secs(30)));
        assert!(!transport.is_running());
        assert_eq!(transport.barrier().pending(), 0);
    }

    #[test]
    fn test_send_after_close_restarts() {
        let (socket, port) = receiver();
        let transport = DatagramTransport::new(TransportConfig::new("127.0.0.1", port));

        transport.send(encode("/one", &[]).unwrap()).unwrap();
        transport.drain();
        transport.close();
        assert!(!transport.is_running());

        transport.send(encode("/two", &[]).unwrap()).unwrap();
        transport.drain();
        assert_eq!(recv(&socket), encode("/one", &[]).unwrap().to_vec());
        assert_eq!(recv(&socket), encode("/two", &[]).unwrap().to_vec());
    }
}
