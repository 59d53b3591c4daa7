//! Background worker plumbing shared by both transports.
//!
//! A worker is a dedicated thread driving a current-thread tokio runtime.
//! It owns its socket and consumes the transport's queue one message at a
//! time, popping a message only after it was written.

use crate::barrier::{ConnectionState, DrainBarrier, QueueState, WorkerSignal};
use crate::error::ClientError;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::thread;

/// Outcome of polling the queue.
pub(crate) enum Next {
    /// Write this message.
    Message(Bytes),
    /// Nothing queued.
    Idle,
    /// The worker was closed or replaced.
    Stop,
}

/// Handle through which a worker touches its transport's shared state.
pub(crate) struct WorkerContext {
    barrier: Arc<DrainBarrier>,
    signal: Arc<WorkerSignal>,
}

impl WorkerContext {
    /// Returns the queue head and marks a write in flight.
    pub(crate) fn next_message(&self) -> Next {
        let mut state = self.barrier.lock();
        if !state.is_current(&self.signal) {
            return Next::Stop;
        }
        match state.queue.front() {
            Some(message) => {
                let message = message.clone();
                state.write_in_flight = true;
                Next::Message(message)
            }
            None => Next::Idle,
        }
    }

    /// Pops the message that was just written.
    ///
    /// Returns `false` if this worker is no longer current.
    pub(crate) fn complete_write(&self) -> bool {
        let mut state = self.barrier.lock();
        if !state.is_current(&self.signal) {
            return false;
        }
        state.queue.pop_front();
        if state.queue.is_empty() {
            state.write_in_flight = false;
            drop(state);
            self.barrier.notify_idle();
        }
        true
    }

    /// Applies `f` to the shared state if this worker is still current.
    pub(crate) fn update(&self, f: impl FnOnce(&mut QueueState)) -> bool {
        let mut state = self.barrier.lock();
        if !state.is_current(&self.signal) {
            return false;
        }
        f(&mut state);
        drop(state);
        self.barrier.notify_idle();
        true
    }

    /// Stops the worker: discards the queue, records `next` and wakes
    /// drain waiters.
    pub(crate) fn finish(&self, next: ConnectionState) {
        let mut state = self.barrier.lock();
        if !state.is_current(&self.signal) {
            return;
        }
        let dropped = state.queue.len();
        state.queue.clear();
        state.write_in_flight = false;
        state.connecting = false;
        state.state = next;
        state.worker = None;
        drop(state);

        if dropped > 0 {
            tracing::warn!("Discarded {} queued message(s)", dropped);
        }
        self.barrier.notify_idle();
    }

    /// Waits for new messages. Returns `false` if the worker was stopped.
    pub(crate) async fn idle(&self) -> bool {
        tokio::select! {
            _ = self.signal.wake.notified() => true,
            _ = self.signal.stop.notified() => false,
        }
    }

    /// Runs `fut` unless the worker is stopped first.
    pub(crate) async fn until_stopped<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            out = fut => Some(out),
            _ = self.signal.stop.notified() => None,
        }
    }
}

/// Starts a worker for a transport whose lock is held by the caller.
///
/// On success the queue state records the new worker as current. On
/// failure the state is left untouched so a later send can retry.
pub(crate) fn start<F, Fut>(
    name: &str,
    barrier: &Arc<DrainBarrier>,
    state: &mut QueueState,
    run: F,
) -> Result<(), ClientError>
where
    F: FnOnce(WorkerContext) -> Fut + Send + 'static,
    Fut: Future<Output = ()>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ClientError::WorkerSpawn)?;

    let signal = Arc::new(WorkerSignal::default());
    let ctx = WorkerContext {
        barrier: barrier.clone(),
        signal: signal.clone(),
    };

    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            runtime.block_on(run(ctx));
            // Don't wait on a resolver thread that may still be blocked.
            runtime.shutdown_background();
        })
        .map_err(ClientError::WorkerSpawn)?;

    tracing::debug!("Started {} worker", name);
    state.worker = Some(signal);
    state.handle = Some(handle);
    Ok(())
}

/// Detaches the running worker, discarding queued messages.
///
/// Returns the worker thread so the caller can join it after releasing the
/// lock.
pub(crate) fn stop(state: &mut QueueState) -> Option<thread::JoinHandle<()>> {
    let dropped = state.queue.len();
    state.queue.clear();
    state.write_in_flight = false;
    state.connecting = false;
    state.state = ConnectionState::Closed;

    if let Some(signal) = state.worker.take() {
        signal.stop.notify_one();
    }
    if dropped > 0 {
        tracing::debug!("Close discarded {} queued message(s)", dropped);
    }
    state.handle.take()
}

/// Joins a stopped worker thread.
pub(crate) fn join(handle: thread::JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::error!("Transport worker panicked");
    }
}
