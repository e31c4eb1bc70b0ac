//! Asynchronous access to synchronous, embedded document engines.
//!
//! This crate is the primary entry point for users of docdispatch. It re-exports the
//! core types from the sub-crates and provides the in-memory engine.
//!
//! Embedded document engines typically expose a synchronous API that must not be called
//! from several threads at once. A [`Database`](database::Database) moves such an engine
//! onto a dedicated worker thread and lets any number of tasks submit operations
//! concurrently: operations are queued in submission order, executed one at a time, and
//! each caller awaits its own [`Completion`](completion::Completion).
//!
//! # Features
//!
//! - **Single-writer dispatch** - The engine is only ever called from its worker, one operation at a time
//! - **Failure isolation** - A failing or panicking operation only rejects its own completion
//! - **Type-safe documents** - Define your data structures with Serde and store them safely
//! - **Flexible querying** - Composable filters, multi-key sorting and pagination
//! - **Transactions** - Scopes that refuse new work as soon as they are closed
//!
//! # Quick Start
//!
//! ```ignore
//! use docdispatch::{prelude::*, memory::MemoryEngine};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: i32,
//!     pub name: String,
//! }
//!
//! impl Document for User {
//!     fn collection_name() -> &'static str { "users" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let database = Database::open(MemoryEngine::new())?;
//!     let users = database.typed_collection::<User>();
//!
//!     users.insert(&User { id: 1, name: "Alice".to_string() })?.await?;
//!
//!     let results = users
//!         .find(Query::filtered(Filter::eq("name", "Alice")))?
//!         .await?;
//!     println!("Queried users: {:?}", results);
//!
//!     database.dispose().await
//! }
//! ```
//!
//! # Transactions
//!
//! ```ignore
//! let transaction = database.begin_transaction().await?;
//! let users = transaction.typed_collection::<User>();
//!
//! users.insert(&User { id: 2, name: "Bob".to_string() })?.await?;
//! transaction.commit()?.await?;
//!
//! // The scope is closed: this fails immediately with TransactionClosed.
//! assert!(users.insert(&User { id: 3, name: "Carol".to_string() }).is_err());
//! ```

pub mod prelude;

pub use docdispatch_core::{
    collection, completion, database, dispatch, document, engine, error, guard, page, query, transaction,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory engine implementation.
pub mod memory {
    pub use docdispatch_memory::{MemoryEngine, MemoryEngineBuilder, MemoryEngineOptions};
}
