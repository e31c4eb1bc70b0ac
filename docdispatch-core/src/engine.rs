//! The synchronous engine boundary.
//!
//! An [`Engine`] is an embedded document database whose API is synchronous and not safe
//! for concurrent use. The dispatch layer moves the engine onto a dedicated worker thread
//! and is its only caller, so every method takes `&self` or `&mut self` without any
//! locking of its own.
//!
//! Implementations must make each call atomic: a call either applies all of its changes
//! or returns an error having applied none.
//!
//! # Example
//!
//! ```ignore
//! use docdispatch::{database::Database, memory::MemoryEngine};
//!
//! let database = Database::open(MemoryEngine::new())?;
//! ```

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

/// Name of the implicit primary key index present on every collection.
pub const PRIMARY_INDEX: &str = "_id";

/// Definition of a secondary index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index name, unique within its collection.
    pub name: String,
    /// Indexed field path.
    pub field: String,
    /// Whether the index rejects duplicate keys.
    pub unique: bool,
}

impl IndexDefinition {
    /// Creates a non-unique index definition.
    pub fn new(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            unique: false,
        }
    }

    /// Creates an index named after the field it indexes.
    pub fn on(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(field.clone(), field)
    }

    /// Sets whether the index enforces unique keys.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Checks the definition is usable before it reaches an engine.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.name.is_empty() || self.field.is_empty() {
            return Err(DocumentStoreError::InvalidIndex(
                "index name and field must not be empty".to_string(),
            ));
        }

        if self.name == PRIMARY_INDEX {
            return Err(DocumentStoreError::InvalidIndex(format!(
                "index name {PRIMARY_INDEX} is reserved"
            )));
        }

        Ok(())
    }
}

/// Synchronous interface of an embedded document engine.
///
/// Collections are created implicitly by the first write that targets them. Reads
/// against a missing collection behave as reads against an empty one.
pub trait Engine: Send + 'static {
    /// Inserts documents, assigning an `_id` to those without one.
    ///
    /// Returns the primary keys of the inserted documents in input order.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::DocumentAlreadyExists`] if an `_id` is taken,
    /// [`DocumentStoreError::DuplicateKey`] if a unique index rejects a document.
    fn insert(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>>;

    /// Replaces documents by `_id`. Documents whose `_id` is not stored are skipped.
    ///
    /// Returns the number of replaced documents.
    fn update(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<usize>;

    /// Inserts or replaces documents by `_id`.
    ///
    /// Returns the number of documents that were inserted rather than replaced.
    fn upsert(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<usize>;

    /// Deletes documents by primary key, returning how many existed.
    fn delete(&mut self, collection: &str, ids: Vec<Bson>) -> DocumentStoreResult<usize>;

    /// Deletes every document matching `filter`, returning how many were removed.
    fn delete_many(&mut self, collection: &str, filter: &Expr) -> DocumentStoreResult<usize>;

    /// Runs a find query.
    fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>>;

    /// Reads one document by primary key.
    fn find_by_id(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>>;

    /// Counts documents matching `filter`, or all documents.
    fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<usize>;

    /// Creates a secondary index unless an identical one exists.
    ///
    /// Returns `true` if the index was created, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidIndex`] if an index with the same name but another
    /// definition exists; [`DocumentStoreError::DuplicateKey`] if a unique index cannot be
    /// built over the stored documents.
    fn ensure_index(&mut self, collection: &str, index: IndexDefinition) -> DocumentStoreResult<bool>;

    /// Drops a secondary index, returning whether it existed.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InvalidIndex`] when asked to drop the primary key index.
    fn drop_index(&mut self, collection: &str, name: &str) -> DocumentStoreResult<bool>;

    /// Lists the secondary indexes of a collection.
    fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDefinition>>;

    /// Lists collection names in ascending order.
    fn collection_names(&self) -> DocumentStoreResult<Vec<String>>;

    /// Drops a collection and its indexes, returning whether it existed.
    fn drop_collection(&mut self, name: &str) -> DocumentStoreResult<bool>;

    /// Renames a collection, returning whether the source existed.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::CollectionAlreadyExists`] if `new_name` is taken.
    fn rename_collection(&mut self, name: &str, new_name: &str) -> DocumentStoreResult<bool>;

    /// Opens an explicit transaction. Returns `false` if one is already open.
    fn begin_transaction(&mut self) -> DocumentStoreResult<bool>;

    /// Commits the open transaction. Returns `false` if none is open.
    fn commit(&mut self) -> DocumentStoreResult<bool>;

    /// Rolls back the open transaction. Returns `false` if none is open.
    fn rollback(&mut self) -> DocumentStoreResult<bool>;

    /// Releases the engine. Called exactly once, on the worker thread, after the last
    /// operation has finished.
    fn close(self: Box<Self>) -> DocumentStoreResult<()> {
        Ok(())
    }
}

impl<E> Engine for Box<E>
where
    E: Engine + ?Sized,
{
    fn insert(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        (**self).insert(collection, documents)
    }

    fn update(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<usize> {
        (**self).update(collection, documents)
    }

    fn upsert(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<usize> {
        (**self).upsert(collection, documents)
    }

    fn delete(&mut self, collection: &str, ids: Vec<Bson>) -> DocumentStoreResult<usize> {
        (**self).delete(collection, ids)
    }

    fn delete_many(&mut self, collection: &str, filter: &Expr) -> DocumentStoreResult<usize> {
        (**self).delete_many(collection, filter)
    }

    fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        (**self).find(collection, query)
    }

    fn find_by_id(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>> {
        (**self).find_by_id(collection, id)
    }

    fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<usize> {
        (**self).count(collection, filter)
    }

    fn ensure_index(&mut self, collection: &str, index: IndexDefinition) -> DocumentStoreResult<bool> {
        (**self).ensure_index(collection, index)
    }

    fn drop_index(&mut self, collection: &str, name: &str) -> DocumentStoreResult<bool> {
        (**self).drop_index(collection, name)
    }

    fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDefinition>> {
        (**self).list_indexes(collection)
    }

    fn collection_names(&self) -> DocumentStoreResult<Vec<String>> {
        (**self).collection_names()
    }

    fn drop_collection(&mut self, name: &str) -> DocumentStoreResult<bool> {
        (**self).drop_collection(name)
    }

    fn rename_collection(&mut self, name: &str, new_name: &str) -> DocumentStoreResult<bool> {
        (**self).rename_collection(name, new_name)
    }

    fn begin_transaction(&mut self) -> DocumentStoreResult<bool> {
        (**self).begin_transaction()
    }

    fn commit(&mut self) -> DocumentStoreResult<bool> {
        (**self).commit()
    }

    fn rollback(&mut self) -> DocumentStoreResult<bool> {
        (**self).rollback()
    }

    fn close(self: Box<Self>) -> DocumentStoreResult<()> {
        (*self).close()
    }
}

/// Factory for engines, mirroring how engines are configured before they are opened.
pub trait EngineBuilder {
    type Engine: Engine;

    fn build(self) -> DocumentStoreResult<Self::Engine>;
}
