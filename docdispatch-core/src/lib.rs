//! Asynchronous access to a synchronous, single-threaded document engine.
//!
//! This crate is the core of the docdispatch project and provides:
//!
//! - **Engine boundary** ([`engine`]) - The synchronous interface an embedded engine implements
//! - **Dispatch layer** ([`dispatch`], [`completion`], [`guard`]) - The single worker that serializes engine calls, the completion handles callers await, and the transaction guard
//! - **Database façade** ([`database`]) - The handle callers share, with its lifecycle
//! - **Collections interface** ([`collection`]) - Typed and untyped collection operations
//! - **Transactions** ([`transaction`]) - Explicit transaction scopes
//! - **Document traits** ([`document`]) - Core traits for defining and serializing documents
//! - **Query and filtering API** ([`query`]) - Query construction and filtering
//! - **Pagination** ([`page`]) - Paged find results
//! - **Error handling** ([`error`]) - Error and result types
//!
//! Every operation is queued in submission order and executed one at a time on a
//! dedicated worker thread that exclusively owns the engine. Callers get a
//! [`Completion`](completion::Completion) back and await it without blocking each other.
//!
//! # Example
//!
//! ```ignore
//! use docdispatch_core::{database::Database, query::Filter};
//! use bson::doc;
//!
//! let database = Database::open(engine)?;
//! let users = database.collection("users");
//!
//! users.insert(doc! { "_id": 1, "name": "a" })?.await?;
//! let found = users.find_one(Filter::eq("name", "a"))?.await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docdispatch_core;

pub mod collection;
pub mod completion;
pub mod database;
pub mod dispatch;
pub mod document;
pub mod engine;
pub mod error;
pub mod guard;
pub mod page;
pub mod query;
pub mod transaction;
