//! Error types and result types for dispatched document operations.
//!
//! Errors reach callers through two disjoint channels:
//!
//! - **Eager** errors are returned directly by the call that tried to schedule an
//!   operation ([`DocumentStoreError::Disposed`], [`DocumentStoreError::TransactionClosed`]).
//!   The operation was never queued.
//! - **Deferred** errors are produced while a queued operation executes on the worker
//!   and are delivered through its [`Completion`](crate::completion::Completion).

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a dispatched database.
///
/// The variant is the error's kind; it is preserved unchanged when an error travels from
/// the worker thread back to the awaiting caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during engine initialization or worker setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested collection does not exist.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// A collection with the given name already exists.
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    /// The collection reached its configured document limit.
    #[error("Collection {0} is full ({1} documents)")]
    CollectionFull(String, usize),
    /// The document violates structural constraints (missing or unusable `_id`, not a document, ...).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// A unique index rejected a write.
    #[error("Duplicate key {key} in unique index {index} of collection {collection}")]
    DuplicateKey {
        /// Name of the violated index.
        index: String,
        /// Collection the index belongs to.
        collection: String,
        /// Offending key, rendered as extended JSON.
        key: String,
    },
    /// The index definition is invalid or conflicts with an existing one.
    #[error("Invalid index: {0}")]
    InvalidIndex(String),
    /// The engine already has an open explicit transaction.
    #[error("A transaction is already in progress")]
    TransactionInProgress,
    /// The operation targeted a transaction scope that was already committed, rolled back or dropped.
    #[error("Transaction is already closed")]
    TransactionClosed,
    /// The database is disposing or disposed; the operation was not (or will not be) executed.
    #[error("Database has been disposed")]
    Disposed,
    /// The operation's completion was dropped by the worker without a result.
    #[error("Operation was abandoned before completing")]
    Abandoned,
    /// The operation panicked while executing on the worker.
    #[error("Operation panicked: {0}")]
    Panicked(String),
    /// The dispatch worker could not be started or is gone.
    #[error("Worker error: {0}")]
    Worker(String),
    /// An error raised by the underlying engine.
    #[error("Engine error: {0}")]
    Engine(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
