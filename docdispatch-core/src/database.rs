//! The database façade: the handle callers share.
//!
//! A [`Database`] owns one dispatch queue and the single worker thread that drives the
//! engine. Every caller-facing operation goes through [`Database::enqueue`] (or the
//! scoped variant used by collections and transactions), which performs the eager
//! checks and then hands the operation to the worker.
//!
//! # Example
//!
//! ```ignore
//! use docdispatch::{prelude::*, memory::MemoryEngine};
//! use bson::doc;
//!
//! let database = Database::open(MemoryEngine::new())?;
//! let users = database.collection("users");
//!
//! users.insert(doc! { "_id": 1, "name": "a" })?.await?;
//! let user = users.find_by_id(1)?.await?;
//!
//! database.dispose().await?;
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, warn};

use crate::{
    collection::{Collection, TypedCollection},
    completion::{self, Completion},
    dispatch::{DatabaseState, DispatchQueue, Lifecycle, OperationRecord, spawn_worker},
    document::Document,
    engine::{Engine, EngineBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    guard::TransactionGuard,
    transaction::{Transaction, rollback_abandoned},
};

/// Default name of the worker thread.
pub const DEFAULT_THREAD_NAME: &str = "docdispatch-worker";

#[derive(Debug)]
pub(crate) struct DatabaseInner {
    queue: DispatchQueue,
    lifecycle: Arc<Lifecycle>,
}

impl DatabaseInner {
    /// Schedules `action` on the worker.
    ///
    /// Eager checks run first, in the caller's context: the database must be active and,
    /// for scoped operations, the scope's guard must be open. A failed check means the
    /// operation was never queued.
    pub(crate) fn enqueue<T, F>(
        &self,
        guard: Option<&TransactionGuard>,
        operation: &'static str,
        action: F,
    ) -> DocumentStoreResult<Completion<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> DocumentStoreResult<T> + Send + 'static,
    {
        self.lifecycle.verify_active()?;

        if let Some(guard) = guard {
            guard.verify_open()?;
        }

        let (completer, completion) = completion::channel();
        self.queue
            .push(operation, Box::new(OperationRecord::new(action, completer)))?;

        Ok(completion)
    }

    fn shutdown(&self) -> Option<Completion<()>> {
        if !self.lifecycle.begin_dispose() {
            return None;
        }

        let (completer, completion) = completion::channel();
        match self.queue.shutdown(completer) {
            Ok(()) => Some(completion),
            Err(err) => {
                debug!(error = %err, "worker already gone at shutdown");
                None
            }
        }
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        if self.shutdown().is_some() {
            debug!("database dropped without dispose, stopping worker");
        }
    }
}

/// The scope an operation is submitted through: the database plus, inside a
/// transaction, that transaction's guard.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scope<'a> {
    database: &'a DatabaseInner,
    guard: Option<&'a TransactionGuard>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(database: &'a DatabaseInner, guard: Option<&'a TransactionGuard>) -> Self {
        Self { database, guard }
    }

    pub(crate) fn enqueue<T, F>(&self, operation: &'static str, action: F) -> DocumentStoreResult<Completion<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> DocumentStoreResult<T> + Send + 'static,
    {
        self.database.enqueue(self.guard, operation, action)
    }
}

/// Asynchronous handle to a synchronous engine.
///
/// Cloning is cheap; clones share the queue and worker. The worker stops when
/// [`Database::dispose`] is called or when the last clone is dropped.
///
/// Every operation method returns `DocumentStoreResult<Completion<T>>`:
///
/// - the outer `Result` reports eager failures ([`DocumentStoreError::Disposed`],
///   [`DocumentStoreError::TransactionClosed`]) and means nothing was queued;
/// - awaiting the [`Completion`] yields the engine's result or error.
///
/// Operations submitted one after the other from the same task execute in that order.
#[derive(Debug, Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Starts a worker for `engine` with default options.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Worker`] if the worker thread cannot be spawned.
    pub fn open(engine: impl Engine) -> DocumentStoreResult<Self> {
        DatabaseBuilder::default().open(engine)
    }

    /// Creates a builder for a database with custom options.
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> DatabaseState {
        self.inner.lifecycle.state()
    }

    /// Schedules an arbitrary action against the engine.
    ///
    /// This is the generic primitive every other operation is built on. The action runs
    /// on the worker thread with exclusive access to the engine; whatever it returns,
    /// including an error, becomes the completion's outcome. A panic inside the action
    /// rejects the completion with [`DocumentStoreError::Panicked`] and leaves the worker
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Disposed`] if the database is disposing or disposed.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let names = database
    ///     .enqueue(|engine| engine.collection_names())?
    ///     .await?;
    /// ```
    pub fn enqueue<T, F>(&self, action: F) -> DocumentStoreResult<Completion<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine) -> DocumentStoreResult<T> + Send + 'static,
    {
        self.inner.enqueue(None, "enqueue", action)
    }

    /// Gets an untyped collection with the given name.
    pub fn collection(&self, name: &str) -> Collection<'_> {
        Collection::new(name.to_string(), Scope::new(&self.inner, None))
    }

    /// Gets a typed collection for the specified document type.
    ///
    /// The collection name is determined by the document type's `collection_name()` method.
    pub fn typed_collection<D: Document>(&self) -> TypedCollection<'_, D> {
        TypedCollection::new(self.collection(D::collection_name()))
    }

    /// Lists collection names.
    pub fn collection_names(&self) -> DocumentStoreResult<Completion<Vec<String>>> {
        self.inner
            .enqueue(None, "collection_names", |engine| engine.collection_names())
    }

    /// Drops a collection and its indexes. Resolves to whether it existed.
    pub fn drop_collection(&self, name: &str) -> DocumentStoreResult<Completion<bool>> {
        let name = name.to_string();
        self.inner
            .enqueue(None, "drop_collection", move |engine| engine.drop_collection(&name))
    }

    /// Renames a collection. Resolves to whether the source existed.
    ///
    /// The completion is rejected with [`DocumentStoreError::CollectionAlreadyExists`] if
    /// `new_name` is taken.
    pub fn rename_collection(&self, name: &str, new_name: &str) -> DocumentStoreResult<Completion<bool>> {
        let (name, new_name) = (name.to_string(), new_name.to_string());
        self.inner.enqueue(None, "rename_collection", move |engine| {
            engine.rename_collection(&name, &new_name)
        })
    }

    /// Opens an explicit transaction on the engine.
    ///
    /// The engine holds a single transaction at a time; while it is open, every operation
    /// the engine executes participates in it. The returned scope hands out collections
    /// bound to its guard: once the scope is committed, rolled back or dropped, their
    /// operations fail eagerly with [`DocumentStoreError::TransactionClosed`].
    ///
    /// Cancelling the returned future before it resolves queues a rollback of whatever
    /// transaction the engine opened for it.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::TransactionInProgress`] if the engine already has an open
    /// transaction, [`DocumentStoreError::Disposed`] if the database is shutting down.
    pub async fn begin_transaction(&self) -> DocumentStoreResult<Transaction<'_>> {
        let opened = Arc::new(AtomicBool::new(false));
        let completion = {
            let opened = opened.clone();
            self.inner.enqueue(None, "begin_transaction", move |engine| {
                let began = engine.begin_transaction()?;
                opened.store(began, Ordering::Release);
                Ok(began)
            })?
        };

        let pending = PendingBegin {
            database: &self.inner,
            opened: Some(opened),
        };
        let result = completion.await;
        pending.disarm();

        if !result? {
            return Err(DocumentStoreError::TransactionInProgress);
        }

        debug!("transaction started");
        Ok(Transaction::new(&self.inner))
    }

    /// Stops the worker and releases the engine.
    ///
    /// New operations are refused immediately. The operation currently executing
    /// finishes; every operation still queued is rejected with
    /// [`DocumentStoreError::Disposed`]. The engine is closed on the worker thread after
    /// the last operation, and this call resolves with the result of that close.
    ///
    /// Calling `dispose` again, or on a clone, waits for the same shutdown and returns
    /// `Ok(())`.
    pub async fn dispose(&self) -> DocumentStoreResult<()> {
        match self.inner.shutdown() {
            Some(completion) => {
                debug!("disposing database");
                completion.await
            }
            None => {
                self.inner.lifecycle.stopped().await;
                Ok(())
            }
        }
    }
}

/// Rolls back the engine transaction of a `begin_transaction` call that was cancelled
/// before its scope existed.
struct PendingBegin<'a> {
    database: &'a DatabaseInner,
    opened: Option<Arc<AtomicBool>>,
}

impl PendingBegin<'_> {
    fn disarm(mut self) {
        self.opened = None;
    }
}

impl Drop for PendingBegin<'_> {
    fn drop(&mut self) {
        let Some(opened) = self.opened.take() else {
            return;
        };

        // Queued behind the begin, so the flag is settled by the time this runs.
        let rollback = move |engine: &mut dyn Engine| {
            if opened.load(Ordering::Acquire) {
                rollback_abandoned(engine)
            } else {
                Ok(false)
            }
        };

        warn!("transaction begin cancelled, rolling back");
        if let Err(err) = self.database.enqueue(None, "rollback", rollback) {
            debug!(error = %err, "rollback of cancelled begin not queued");
        }
    }
}

/// Options for opening a [`Database`].
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    thread_name: String,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl DatabaseBuilder {
    /// Sets the name of the worker thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Moves `engine` onto a new worker thread and returns the façade.
    pub fn open(self, engine: impl Engine) -> DocumentStoreResult<Database> {
        let lifecycle = Arc::new(Lifecycle::new());
        let queue = spawn_worker(Box::new(engine), self.thread_name.clone(), lifecycle.clone())?;

        debug!(thread = %self.thread_name, "database opened");
        Ok(Database {
            inner: Arc::new(DatabaseInner { queue, lifecycle }),
        })
    }

    /// Builds an engine from `builder` and opens it.
    pub fn open_with<B: EngineBuilder>(self, builder: B) -> DocumentStoreResult<Database> {
        self.open(builder.build()?)
    }
}
