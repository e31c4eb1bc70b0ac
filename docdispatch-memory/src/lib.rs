//! In-memory document engine for docdispatch.
//!
//! This crate provides [`MemoryEngine`], a synchronous implementation of the
//! [`Engine`](docdispatch_core::engine::Engine) trait. Like the embedded engines the
//! dispatch layer is built for, it is not meant to be shared between threads: the
//! database façade moves it onto its worker and calls it one operation at a time.
//!
//! # Features
//!
//! - **Ordered storage** - Documents are kept in primary key order
//! - **Full query support** - Filtering on dotted paths, multi-key sorting, skip and limit
//! - **Unique indexes** - Enforced on every write
//! - **Snapshot transactions** - Begin, commit and rollback of one explicit transaction
//!
//! # Quick Start
//!
//! ```ignore
//! use docdispatch::{prelude::*, memory::MemoryEngine};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let database = Database::open(MemoryEngine::new())?;
//!     let users = database.collection("users");
//!
//!     users.insert(doc! { "_id": 1, "name": "Alice" })?.await?;
//!     database.dispose().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docdispatch_memory;

pub mod engine;
mod evaluator;
mod key;

pub use engine::{MemoryEngine, MemoryEngineBuilder, MemoryEngineOptions};
