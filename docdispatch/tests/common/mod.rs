//! Shared test utilities for the integration suites.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use bson::{Bson, Document as BsonDocument};
use docdispatch::{
    document::Document,
    engine::{Engine, IndexDefinition},
    error::{DocumentStoreError, DocumentStoreResult},
    memory::MemoryEngine,
    query::{Expr, Query},
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Documents
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: i32,
    pub name: String,
    pub age: i32,
}

impl User {
    pub fn new(id: i32, name: &str, age: i32) -> Self {
        Self {
            id,
            name: name.to_string(),
            age,
        }
    }
}

impl Document for User {
    fn collection_name() -> &'static str {
        "users"
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Observes what the worker does with an engine: which calls it makes, in which order,
/// and how many run at the same time.
#[derive(Debug, Default)]
pub struct Probe {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
    log: Mutex<Vec<String>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs `f` as one observed engine call labelled `entry`.
    pub fn observe<T>(&self, entry: &str, f: impl FnOnce() -> T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().unwrap().push(entry.to_string());

        // Widen the window in which an overlapping call would be noticed.
        std::thread::yield_now();

        let result = f();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Number of logged calls labelled exactly `entry`.
    pub fn calls_to(&self, entry: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|logged| *logged == entry).count()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Polls until the engine has been closed, failing the test after a few seconds.
    pub async fn wait_closed(&self) {
        for _ in 0..200 {
            if self.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        panic!("engine was never closed");
    }
}

// ============================================================================
// ProbeEngine
// ============================================================================

/// A [`MemoryEngine`] whose every call is recorded by a [`Probe`].
pub struct ProbeEngine {
    inner: MemoryEngine,
    probe: Arc<Probe>,
    fail_close: bool,
}

impl ProbeEngine {
    pub fn new(probe: Arc<Probe>) -> Self {
        Self {
            inner: MemoryEngine::new(),
            probe,
            fail_close: false,
        }
    }

    /// An engine whose `close` reports an error.
    pub fn failing_close(probe: Arc<Probe>) -> Self {
        Self {
            fail_close: true,
            ..Self::new(probe)
        }
    }
}

impl Engine for ProbeEngine {
    fn insert(&mut self, collection: &str, documents: Vec<BsonDocument>) -> DocumentStoreResult<Vec<Bson>> {
        self.probe.observe("insert", || self.inner.insert(collection, documents))
    }

    fn update(&mut self, collection: &str, documents: Vec<BsonDocument>) -> DocumentStoreResult<usize> {
        self.probe.observe("update", || self.inner.update(collection, documents))
    }

    fn upsert(&mut self, collection: &str, documents: Vec<BsonDocument>) -> DocumentStoreResult<usize> {
        self.probe.observe("upsert", || self.inner.upsert(collection, documents))
    }

    fn delete(&mut self, collection: &str, ids: Vec<Bson>) -> DocumentStoreResult<usize> {
        self.probe.observe("delete", || self.inner.delete(collection, ids))
    }

    fn delete_many(&mut self, collection: &str, filter: &Expr) -> DocumentStoreResult<usize> {
        self.probe.observe("delete_many", || self.inner.delete_many(collection, filter))
    }

    fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<BsonDocument>> {
        self.probe.observe("find", || self.inner.find(collection, query))
    }

    fn find_by_id(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<BsonDocument>> {
        self.probe.observe("find_by_id", || self.inner.find_by_id(collection, id))
    }

    fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<usize> {
        self.probe.observe("count", || self.inner.count(collection, filter))
    }

    fn ensure_index(&mut self, collection: &str, index: IndexDefinition) -> DocumentStoreResult<bool> {
        self.probe.observe("ensure_index", || self.inner.ensure_index(collection, index))
    }

    fn drop_index(&mut self, collection: &str, name: &str) -> DocumentStoreResult<bool> {
        self.probe.observe("drop_index", || self.inner.drop_index(collection, name))
    }

    fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDefinition>> {
        self.probe.observe("list_indexes", || self.inner.list_indexes(collection))
    }

    fn collection_names(&self) -> DocumentStoreResult<Vec<String>> {
        self.probe.observe("collection_names", || self.inner.collection_names())
    }

    fn drop_collection(&mut self, name: &str) -> DocumentStoreResult<bool> {
        self.probe.observe("drop_collection", || self.inner.drop_collection(name))
    }

    fn rename_collection(&mut self, name: &str, new_name: &str) -> DocumentStoreResult<bool> {
        self.probe
            .observe("rename_collection", || self.inner.rename_collection(name, new_name))
    }

    fn begin_transaction(&mut self) -> DocumentStoreResult<bool> {
        self.probe.observe("begin_transaction", || self.inner.begin_transaction())
    }

    fn commit(&mut self) -> DocumentStoreResult<bool> {
        self.probe.observe("commit", || self.inner.commit())
    }

    fn rollback(&mut self) -> DocumentStoreResult<bool> {
        self.probe.observe("rollback", || self.inner.rollback())
    }

    fn close(self: Box<Self>) -> DocumentStoreResult<()> {
        let ProbeEngine { inner, probe, fail_close } = *self;

        let result = probe.observe("close", || Box::new(inner).close());
        probe.closed.store(true, Ordering::SeqCst);

        if fail_close {
            return Err(DocumentStoreError::Engine("close failed".to_string()));
        }

        result
    }
}
