//! Drain barrier shared between a transport and its worker.
//!
//! All state touched by both the caller threads and the worker (the send
//! queue, the in-flight flags and the connection state) lives behind a
//! single mutex. The paired condition variable is signalled whenever the
//! worker makes a transition that can leave the transport idle.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Connection phase of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No worker, or the last connection attempt failed.
    Disconnected,
    /// Resolving the destination or connecting to a candidate.
    Connecting,
    /// Ready to write.
    Connected,
    /// Closed by the caller or by a write failure.
    Closed,
}

/// Wakeups for one worker lifetime.
#[derive(Debug, Default)]
pub(crate) struct WorkerSignal {
    /// Messages were queued.
    pub(crate) wake: Notify,
    /// The transport was closed.
    pub(crate) stop: Notify,
}

/// State guarded by the barrier mutex.
#[derive(Debug)]
pub(crate) struct QueueState {
    pub(crate) queue: VecDeque<Bytes>,
    pub(crate) write_in_flight: bool,
    pub(crate) connecting: bool,
    pub(crate) state: ConnectionState,
    /// Signal of the running worker. `None` once it stopped or was detached.
    pub(crate) worker: Option<Arc<WorkerSignal>>,
    pub(crate) handle: Option<JoinHandle<()>>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            write_in_flight: false,
            connecting: false,
            state: ConnectionState::Disconnected,
            worker: None,
            handle: None,
        }
    }

    /// Returns whether there is queued work or a connection attempt.
    pub(crate) fn is_busy(&self) -> bool {
        !self.queue.is_empty() || self.write_in_flight || self.connecting
    }

    /// Returns whether `signal` belongs to the running worker.
    pub(crate) fn is_current(&self, signal: &Arc<WorkerSignal>) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| Arc::ptr_eq(worker, signal))
    }
}

/// Lets callers block until a transport has nothing left to send.
#[derive(Debug)]
pub struct DrainBarrier {
    state: Mutex<QueueState>,
    idle: Condvar,
}

impl DrainBarrier {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            idle: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    /// Wakes every thread blocked in [`wait`](Self::wait).
    pub(crate) fn notify_idle(&self) {
        self.idle.notify_all();
    }

    /// Blocks until the queue is empty and no write or connection attempt
    /// is in flight.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.is_busy() {
            self.idle.wait(&mut state);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `true` if the transport became idle.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.is_busy() {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.is_busy();
            }
        }
        true
    }

    /// Returns whether there is queued work or a connection attempt.
    pub fn is_busy(&self) -> bool {
        self.state.lock().is_busy()
    }

    /// Returns the number of messages waiting to be written.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.state.lock().state
    }
}
