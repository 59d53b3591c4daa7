//! Reliable, ordered transport over TCP.
//!
//! Messages are written one at a time, each preceded by its 4-byte
//! big-endian length. The connection is opened lazily by the first send and
//! tries every resolved address of the host in order.

use crate::barrier::{ConnectionState, DrainBarrier};
use crate::config::ClosePolicy;
use crate::error::ClientError;
use crate::transport::{Transport, TransportConfig};
use crate::worker::{self, Next, WorkerContext};
use amc_protocol::length_prefixed;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};

/// A TCP client that sends length-prefixed OSC messages.
pub struct StreamTransport {
    config: TransportConfig,
    barrier: Arc<DrainBarrier>,
}

impl StreamTransport {
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

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.barrier.connection_state()
    }

    /// Returns the drain barrier of this transport.
    pub fn barrier(&self) -> &DrainBarrier {
        &self.barrier
    }

    /// Queues `message`. Connects first if no worker is running.
    pub fn send(&self, message: Bytes) -> Result<(), ClientError> {
        let mut state = self.barrier.lock();

        if let Some(signal) = state.worker.clone() {
            state.queue.push_back(message);
            signal.wake.notify_one();
            return Ok(());
        }

        let host = self.config.host.clone();
        let port = self.config.port;
        let connect_timeout = self.config.connect_timeout;
        worker::start("amc-stream", &self.barrier, &mut state, move |ctx| {
            run(ctx, host, port, connect_timeout)
        })?;

        state.queue.push_back(message);
        state.state = ConnectionState::Connecting;
        state.connecting = true;
        Ok(())
    }

    /// Blocks until the queue is empty and no connection attempt is pending.
    pub fn drain(&self) {
        self.barrier.wait();
    }

    /// Bounded [`drain`](Self::drain). Returns `true` if drained.
    pub fn drain_timeout(&self, timeout: Duration) -> bool {
        self.barrier.wait_timeout(timeout)
    }

    /// Closes the connection and discards unsent messages.
    ///
    /// A later send opens a new connection.
    pub fn close(&self) {
        let handle = worker::stop(&mut self.barrier.lock());
        self.barrier.notify_idle();
        if let Some(handle) = handle {
            worker::join(handle);
            tracing::debug!(
                "Stream transport to {}:{} closed",
                self.config.host,
                self.config.port
            );
        }
    }
}

impl Transport for StreamTransport {
    fn send(&self, message: Bytes) -> Result<(), ClientError> {
        StreamTransport::send(self, message)
    }

    fn drain(&self) {
        StreamTransport::drain(self)
    }

    fn drain_timeout(&self, timeout: Duration) -> bool {
        StreamTransport::drain_timeout(self, timeout)
    }

    fn close(&self) {
        StreamTransport::close(self)
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        if self.config.close_policy == ClosePolicy::DrainFirst
            && !self.drain_timeout(self.config.drain_timeout)
        {
            tracing::warn!(
                "Timed out draining stream transport to {}:{}",
                self.config.host,
                self.config.port
            );
        }
        self.close();
    }
}

async fn run(ctx: WorkerContext, host: String, port: u16, connect_timeout: Duration) {
    let Some(mut stream) = connect(&ctx, &host, port, connect_timeout).await else {
        return;
    };

    let connected = ctx.update(|state| {
        state.state = ConnectionState::Connected;
        state.connecting = false;
    });
    if !connected {
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
            Next::Message(message) => {
                let framed = length_prefixed(&message);
                match ctx.until_stopped(stream.write_all(&framed)).await {
                    None => return,
                    Some(Ok(())) => {
                        tracing::trace!("Wrote {} byte message", message.len());
                        if !ctx.complete_write() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Write to {}:{} failed: {}", host, port, e);
                        ctx.finish(ConnectionState::Closed);
                        return;
                    }
                }
            }
        }
    }
}

/// Resolves `host` and connects to the first reachable candidate.
async fn connect(
    ctx: &WorkerContext,
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Option<TcpStream> {
    let candidates: Vec<SocketAddr> = match ctx.until_stopped(lookup_host((host, port))).await? {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            tracing::warn!("Failed to resolve {}:{}: {}", host, port, e);
            ctx.finish(ConnectionState::Disconnected);
            return None;
        }
    };

    for addr in candidates {
        tracing::debug!("Connecting to {}...", addr);
        let attempt = tokio::time::timeout(connect_timeout, TcpStream::connect(addr));
        match ctx.until_stopped(attempt).await? {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).ok();
                tracing::debug!("Connected to {}", addr);
                return Some(stream);
            }
            Ok(Err(e)) => tracing::debug!("Connection to {} failed: {}", addr, e),
            Err(_) => tracing::debug!("Connection to {} timed out", addr),
        }
    }

    tracing::warn!("Could not connect to {}:{}", host, port);
    ctx.finish(ConnectionState::Disconnected);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use amc_protocol::{encode, Argument};
    use std::io::Read;
    use std::net::TcpListener;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    fn transport(port: u16) -> StreamTransport {
        StreamTransport::new(
            TransportConfig::new("127.0.0.1", port)
                .with_connect_timeout(Duration::from_secs(2))
                .with_close_policy(ClosePolicy::CloseImmediately),
        )
    }

    fn read_frame(stream: &mut std::net::TcpStream) -> Vec<u8> {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).unwrap();
        let mut buf = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut buf).unwrap();
        buf
    }

    fn accept(listener: &TcpListener) -> std::net::TcpStream {
        let (stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn sequence(i: i32) -> Bytes {
        encode("/seq", &[Argument::Int32(i)]).unwrap()
    }

    #[test]
    fn test_new_transport_is_idle() {
        let transport = StreamTransport::new(
            TransportConfig::new("127.0.0.1", 9).with_close_policy(ClosePolicy::CloseImmediately),
        );
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.barrier().pending(), 0);
        transport.drain();
    }

    #[test]
    fn test_close_without_worker() {
        let transport = StreamTransport::new(TransportConfig::new("127.0.0.1", 9));
        transport.close();
        transport.close();
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_ordered_length_prefixed_delivery() {
        let (listener, port) = listener();
        let transport = transport(port);

        for i in 0..100 {
            transport.send(sequence(i)).unwrap();
        }
        transport.drain();
        assert_eq!(transport.state(), ConnectionState::Connected);
        assert_eq!(transport.barrier().pending(), 0);

        let mut peer = accept(&listener);
        for i in 0..100 {
            assert_eq!(read_frame(&mut peer), sequence(i).to_vec());
        }
    }

    #[test]
    fn test_sends_from_many_threads() {
        let (listener, port) = listener();
        let transport = Arc::new(transport(port));

        let senders: Vec<_> = (0..4)
            .map(|t| {
                let transport = transport.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        transport.send(sequence(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.join().unwrap();
        }
        transport.drain();

        let mut peer = accept(&listener);
        let mut last = [-1i32; 4];
        for _ in 0..100 {
            let frame = read_frame(&mut peer);
            let value = i32::from_be_bytes(frame[frame.len() - 4..].try_into().unwrap());
            let thread = (value / 100) as usize;
            // Per-thread submission order survives.
            assert!(value % 100 > last[thread]);
            last[thread] = value % 100;
        }
    }

    #[test]
    fn test_unreachable_server_discards_queue() {
        let (listener, port) = listener();
        drop(listener);

        let transport = transport(port);
        for i in 0..3 {
            transport.send(sequence(i)).unwrap();
        }
        assert!(transport.drain_timeout(Duration::from_secs(10)));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.barrier().pending(), 0);
    }

    #[test]
    fn test_unresolvable_host_discards_queue() {
        let transport = StreamTransport::new(
            TransportConfig::new("host.invalid", 15002)
                .with_close_policy(ClosePolicy::CloseImmediately),
        );
        transport.send(sequence(0)).unwrap();
        assert!(transport.drain_timeout(Duration::from_secs(30)));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_after_close_reconnects() {
        let (listener, port) = listener();
        let transport = transport(port);

        transport.send(sequence(1)).unwrap();
        transport.drain();
        let mut first = accept(&listener);
        assert_eq!(read_frame(&mut first), sequence(1).to_vec());

        transport.close();
        transport.close();
        assert_eq!(transport.state(), ConnectionState::Closed);

        // The old connection sees EOF.
        let mut rest = Vec::new();
        first.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());

        transport.send(sequence(2)).unwrap();
        transport.drain();
        assert_eq!(transport.state(), ConnectionState::Connected);
        let mut second = accept(&listener);
        assert_eq!(read_frame(&mut second), sequence(2).to_vec());
    }

    #[test]
    fn test_write_failure_closes_and_restarts() {
        let (listener, port) = listener();
        let transport = transport(port);
        let bulk = encode("/bulk", &[Argument::String("x".repeat(60_000))]).unwrap();

        transport.send(bulk.clone()).unwrap();
        drop(accept(&listener));

        let mut closed = false;
        for _ in 0..1000 {
            transport.send(bulk.clone()).unwrap();
            assert!(transport.drain_timeout(Duration::from_secs(5)));
            if transport.state() == ConnectionState::Closed {
                closed = true;
                break;
            }
        }
        assert!(closed, "write to a reset peer never failed");
        assert_eq!(transport.barrier().pending(), 0);

        transport.send(sequence(7)).unwrap();
        transport.drain();
        assert_eq!(transport.state(), ConnectionState::Connected);
        let mut peer = accept(&listener);
        assert_eq!(read_frame(&mut peer), sequence(7).to_vec());
    }

    #[test]
    fn test_drop_drains_first() {
        let (listener, port) = listener();
        let transport = StreamTransport::new(TransportConfig::new("127.0.0.1", port));
        for i in 0..10 {
            transport.send(sequence(i)).unwrap();
        }
        drop(transport);

        let mut peer = accept(&listener);
        for i in 0..10 {
            assert_eq!(read_frame(&mut peer), sequence(i).to_vec());
        }
    }
}
