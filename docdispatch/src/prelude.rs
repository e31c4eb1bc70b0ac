//! Convenient re-exports of commonly used types from docdispatch.
//!
//! ```ignore
//! use docdispatch::prelude::*;
//! ```

pub use docdispatch_core::{
    collection::{Collection, TypedCollection},
    completion::Completion,
    database::{Database, DatabaseBuilder},
    dispatch::DatabaseState,
    document::{Document, DocumentExt},
    engine::{Engine, EngineBuilder, IndexDefinition},
    error::{DocumentStoreError, DocumentStoreResult},
    guard::TransactionGuard,
    page::{Page, PaginationParams},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    transaction::Transaction,
};
