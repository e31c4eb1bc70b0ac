//! The dispatch queue and its single worker.
//!
//! Callers push operation records onto an unbounded FIFO channel; one dedicated OS
//! thread owns the engine, pops records in order and runs them one at a time. A failing
//! or panicking operation rejects its own completion and the loop moves on. Only a
//! shutdown request (or every sender going away) ends the loop, after which the
//! remaining records are rejected with [`DocumentStoreError::Disposed`] and the engine
//! is closed.

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    thread,
};

use mea::latch::Latch;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::{
    completion::Completer,
    engine::Engine,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// A queued unit of work, type-erased over its result type.
pub(crate) trait Operation: Send {
    /// Runs the action against the engine and resolves the completion with its outcome.
    fn execute(self: Box<Self>, engine: &mut dyn Engine);

    /// Rejects the completion without running the action.
    fn reject(self: Box<Self>, error: DocumentStoreError);
}

/// An action paired with the completer it resolves.
pub(crate) struct OperationRecord<T, F> {
    action: F,
    completer: Completer<T>,
}

impl<T, F> OperationRecord<T, F> {
    pub(crate) fn new(action: F, completer: Completer<T>) -> Self {
        Self { action, completer }
    }
}

impl<T, F> Operation for OperationRecord<T, F>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn Engine) -> DocumentStoreResult<T> + Send + 'static,
{
    fn execute(self: Box<Self>, engine: &mut dyn Engine) {
        let OperationRecord { action, completer } = *self;

        let result = match panic::catch_unwind(AssertUnwindSafe(|| action(engine))) {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(panic = %message, "dispatched operation panicked");
                Err(DocumentStoreError::Panicked(message))
            }
        };

        completer.complete(result);
    }

    fn reject(self: Box<Self>, error: DocumentStoreError) {
        self.completer.reject(error);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(non-string panic)".to_string())
}

enum Job {
    Run {
        sequence: u64,
        operation: &'static str,
        record: Box<dyn Operation>,
    },
    Shutdown(Completer<()>),
}

/// Producer side of the dispatch queue. Safe to share between any number of callers.
pub(crate) struct DispatchQueue {
    sender: mpsc::UnboundedSender<Job>,
    sequence: AtomicU64,
}

impl DispatchQueue {
    /// Appends a record, returning its sequence number.
    ///
    /// Fails with [`DocumentStoreError::Disposed`] once the worker stopped accepting work.
    pub(crate) fn push(&self, operation: &'static str, record: Box<dyn Operation>) -> DocumentStoreResult<u64> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);

        self.sender
            .send(Job::Run { sequence, operation, record })
            .map_err(|_| DocumentStoreError::Disposed)?;

        trace!(sequence, operation, "operation queued");
        Ok(sequence)
    }

    /// Queues the shutdown signal. `completer` resolves with the engine's close result.
    pub(crate) fn shutdown(&self, completer: Completer<()>) -> DocumentStoreResult<()> {
        self.sender
            .send(Job::Shutdown(completer))
            .map_err(|_| DocumentStoreError::Worker("dispatch worker is not running".to_string()))
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("submitted", &self.sequence.load(Ordering::Relaxed))
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// Lifecycle state of a database façade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseState {
    /// Accepting operations; the worker is running.
    Active,
    /// No new operations are accepted; the worker is draining.
    Disposing,
    /// The worker has stopped and the engine is released.
    Disposed,
}

const ACTIVE: u8 = 0;
const DISPOSING: u8 = 1;
const DISPOSED: u8 = 2;

/// Lifecycle shared between the façade and its worker.
pub(crate) struct Lifecycle {
    state: AtomicU8,
    stopped: Latch,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(ACTIVE),
            stopped: Latch::new(1),
        }
    }

    pub(crate) fn state(&self) -> DatabaseState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => DatabaseState::Active,
            DISPOSING => DatabaseState::Disposing,
            _ => DatabaseState::Disposed,
        }
    }

    pub(crate) fn verify_active(&self) -> DocumentStoreResult<()> {
        match self.state() {
            DatabaseState::Active => Ok(()),
            _ => Err(DocumentStoreError::Disposed),
        }
    }

    /// Moves `Active` to `Disposing`. Returns `true` for the caller that made the move.
    pub(crate) fn begin_dispose(&self) -> bool {
        self.state
            .compare_exchange(ACTIVE, DISPOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(DISPOSED, Ordering::Release);
        self.stopped.count_down();
    }

    /// Waits until the worker has stopped and released the engine.
    pub(crate) async fn stopped(&self) {
        self.stopped.wait().await;
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle").field("state", &self.state()).finish()
    }
}

/// Spawns the worker thread that owns `engine` and returns the queue feeding it.
pub(crate) fn spawn_worker(
    engine: Box<dyn Engine>,
    thread_name: String,
    lifecycle: Arc<Lifecycle>,
) -> DocumentStoreResult<DispatchQueue> {
    let (sender, receiver) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || run_worker(engine, receiver, &lifecycle))
        .map_err(|e| DocumentStoreError::Worker(format!("failed to spawn {thread_name}: {e}")))?;

    Ok(DispatchQueue {
        sender,
        sequence: AtomicU64::new(0),
    })
}

fn run_worker(mut engine: Box<dyn Engine>, mut receiver: mpsc::UnboundedReceiver<Job>, lifecycle: &Lifecycle) {
    debug!("dispatch worker started");

    let mut shutdown = Vec::new();
    let mut drained = 0usize;

    while let Some(job) = receiver.blocking_recv() {
        match job {
            // Once disposal has begun, records ahead of the shutdown marker are rejected too.
            Job::Run { sequence, operation, record } if lifecycle.state() != DatabaseState::Active => {
                trace!(sequence, operation, "rejecting operation on shutdown");
                record.reject(DocumentStoreError::Disposed);
                drained += 1;
            }
            Job::Run { sequence, operation, record } => {
                debug!(sequence, operation, "executing operation");
                record.execute(&mut *engine);
            }
            Job::Shutdown(completer) => {
                shutdown.push(completer);
                break;
            }
        }
    }

    // Nothing can be sent past this point; whatever is still buffered gets rejected.
    receiver.close();

    while let Some(job) = receiver.blocking_recv() {
        match job {
            Job::Run { sequence, operation, record } => {
                trace!(sequence, operation, "rejecting operation on shutdown");
                record.reject(DocumentStoreError::Disposed);
                drained += 1;
            }
            Job::Shutdown(completer) => shutdown.push(completer),
        }
    }

    if drained > 0 {
        warn!(drained, "rejected pending operations on shutdown");
    }

    let closed = engine.close();
    if let Err(err) = &closed {
        error!(error = %err, "engine close failed");
    }

    lifecycle.finish();
    debug!("dispatch worker stopped");

    for completer in shutdown {
        completer.complete(closed.clone());
    }
}
