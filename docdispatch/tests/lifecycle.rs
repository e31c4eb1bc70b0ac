//! Database Lifecycle Tests
//!
//! Tests for opening and disposing a database:
//! - Disposing rejects queued operations and refuses new ones
//! - The engine is released only after the worker has stopped
//! - Dropping the last handle stops the worker
//! - Builder options

mod common;

use std::{
    sync::{Arc, Barrier},
    thread,
};

use bson::doc;
use docdispatch::{memory::MemoryEngine, prelude::*};
use futures::poll;

use common::{Probe, ProbeEngine};

// ============================================================================
// Dispose
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispose_rejects_every_queued_operation() {
    const QUEUED: usize = 8;

    let probe = Probe::new();
    let database = Database::open(ProbeEngine::new(probe.clone())).unwrap();

    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let blocker = {
        let (entered, release) = (entered.clone(), release.clone());
        database
            .enqueue(move |_| {
                entered.wait();
                release.wait();
                Ok("finished")
            })
            .unwrap()
    };

    // The worker is now inside the blocker; everything below stays queued.
    entered.wait();

    let users = database.collection("users");
    let queued = (0..QUEUED as i32)
        .map(|i| users.insert(doc! { "_id": i }).unwrap())
        .collect::<Vec<_>>();

    let mut dispose = Box::pin(database.dispose());
    assert!(poll!(&mut dispose).is_pending());
    assert_eq!(database.state(), DatabaseState::Disposing);

    release.wait();
    dispose.await.unwrap();

    // The operation in flight when dispose began still completed.
    assert_eq!(blocker.await, Ok("finished"));

    for completion in queued {
        assert_eq!(completion.await, Err(DocumentStoreError::Disposed));
    }

    assert_eq!(probe.calls_to("insert"), 0);
    assert_eq!(database.state(), DatabaseState::Disposed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispose_racing_with_callers_on_other_threads_rejects_their_work() {
    const CALLERS: usize = 4;

    let probe = Probe::new();
    let database = Database::open(ProbeEngine::new(probe.clone())).unwrap();

    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let blocker = {
        let (entered, release) = (entered.clone(), release.clone());
        database
            .enqueue(move |_| {
                entered.wait();
                release.wait();
                Ok(())
            })
            .unwrap()
    };
    entered.wait();

    // Each caller keeps submitting until the database refuses, so some submissions
    // land while dispose is starting.
    let started = Arc::new(Barrier::new(CALLERS + 1));
    let callers = (0..CALLERS as i64)
        .map(|caller| {
            let database = database.clone();
            let started = started.clone();

            thread::spawn(move || {
                let users = database.collection("users");
                let mut queued = Vec::new();

                for i in 0i64.. {
                    match users.insert(doc! { "_id": caller * 1_000_000 + i }) {
                        Ok(completion) => queued.push(completion),
                        Err(err) => {
                            assert_eq!(err, DocumentStoreError::Disposed);
                            break;
                        }
                    }
                    if i == 0 {
                        started.wait();
                    }
                }

                queued
            })
        })
        .collect::<Vec<_>>();

    started.wait();
    let mut dispose = Box::pin(database.dispose());
    assert!(poll!(&mut dispose).is_pending());

    let queued = callers
        .into_iter()
        .flat_map(|caller| caller.join().unwrap())
        .collect::<Vec<_>>();
    assert!(queued.len() >= CALLERS);

    release.wait();
    dispose.await.unwrap();
    blocker.await.unwrap();

    for completion in queued {
        assert_eq!(completion.await, Err(DocumentStoreError::Disposed));
    }
    assert_eq!(probe.calls_to("insert"), 0);
}

#[tokio::test]
async fn nothing_is_accepted_after_dispose() {
    let database = Database::open(MemoryEngine::new()).unwrap();
    database.dispose().await.unwrap();

    let users = database.collection("users");

    assert!(matches!(database.enqueue(|_| Ok(())), Err(DocumentStoreError::Disposed)));
    assert!(matches!(users.insert(doc! { "_id": 1 }), Err(DocumentStoreError::Disposed)));
    assert!(matches!(users.find_all(), Err(DocumentStoreError::Disposed)));
    assert!(matches!(database.collection_names(), Err(DocumentStoreError::Disposed)));
    assert!(matches!(database.begin_transaction().await, Err(DocumentStoreError::Disposed)));
}

#[tokio::test]
async fn dispose_is_idempotent_across_clones() {
    let probe = Probe::new();
    let database = Database::open(ProbeEngine::new(probe.clone())).unwrap();
    let clone = database.clone();

    database.dispose().await.unwrap();
    clone.dispose().await.unwrap();
    database.dispose().await.unwrap();

    assert_eq!(clone.state(), DatabaseState::Disposed);
    assert_eq!(probe.calls_to("close"), 1);
}

#[tokio::test]
async fn engine_is_closed_after_the_last_operation() {
    let probe = Probe::new();
    let database = Database::open(ProbeEngine::new(probe.clone())).unwrap();
    let users = database.collection("users");

    users.insert(doc! { "_id": 1 }).unwrap().await.unwrap();
    assert_eq!(users.count(None).unwrap().await, Ok(1));

    database.dispose().await.unwrap();

    assert!(probe.is_closed());
    assert_eq!(probe.log().last().map(String::as_str), Some("close"));
    assert_eq!(probe.max_in_flight(), 1);
}

#[tokio::test]
async fn close_failure_is_reported_by_dispose() {
    let probe = Probe::new();
    let database = Database::open(ProbeEngine::failing_close(probe.clone())).unwrap();

    assert_eq!(
        database.dispose().await,
        Err(DocumentStoreError::Engine("close failed".to_string()))
    );
    assert_eq!(database.state(), DatabaseState::Disposed);
}

#[tokio::test]
async fn dropping_the_last_handle_stops_the_worker() {
    let probe = Probe::new();
    let database = Database::open(ProbeEngine::new(probe.clone())).unwrap();
    let clone = database.clone();

    drop(database);
    assert_eq!(clone.state(), DatabaseState::Active);

    drop(clone);
    probe.wait_closed().await;
}

// ============================================================================
// Options
// ============================================================================

#[tokio::test]
async fn worker_thread_uses_configured_name() {
    let database = Database::builder()
        .thread_name("users-db")
        .open(MemoryEngine::new())
        .unwrap();

    let name = database
        .enqueue(|_| Ok(thread::current().name().map(str::to_string)))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(name.as_deref(), Some("users-db"));
}

#[tokio::test]
async fn default_worker_thread_name() {
    let database = Database::open(MemoryEngine::new()).unwrap();

    let name = database
        .enqueue(|_| Ok(thread::current().name().map(str::to_string)))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(name.as_deref(), Some(docdispatch::database::DEFAULT_THREAD_NAME));
}

#[tokio::test]
async fn engine_builder_options_are_applied() {
    let database = Database::builder()
        .open_with(MemoryEngine::builder().max_documents_per_collection(1))
        .unwrap();
    let users = database.collection("users");

    users.insert(doc! { "_id": 1 }).unwrap().await.unwrap();

    assert_eq!(
        users.insert(doc! { "_id": 2 }).unwrap().await,
        Err(DocumentStoreError::CollectionFull("users".to_string(), 1))
    );
}

#[test]
fn invalid_engine_options_fail_to_open() {
    let result = Database::builder().open_with(MemoryEngine::builder().max_documents_per_collection(0));

    assert!(matches!(result, Err(DocumentStoreError::Initialization(_))));
}
