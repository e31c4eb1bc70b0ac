//! Collection handles.
//!
//! A collection handle names a collection and the scope its operations are submitted
//! through: the database directly, or an open transaction. Each method turns into exactly
//! one dispatched operation and returns it as a [`Completion`].
//!
//! - [`Collection`] - untyped collection working with BSON documents
//! - [`TypedCollection`] - collection of a specific [`Document`] type
//!
//! # Example
//!
//! ```ignore
//! use docdispatch::prelude::*;
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
//! let users = database.typed_collection::<User>();
//! users.insert(&User { id: 1, name: "Alice".to_string() })?.await?;
//! let alice = users.find_by_id(1)?.await?;
//! ```

use std::marker::PhantomData;

use bson::{Bson, Document as BsonDocument};

use crate::{
    completion::Completion,
    database::Scope,
    document::{Document, DocumentExt, ID_FIELD},
    engine::{Engine, IndexDefinition},
    error::{DocumentStoreError, DocumentStoreResult},
    page::{Page, PaginationParams},
    query::{Expr, Query, Sort},
};

/// An untyped collection.
///
/// Documents are plain [`bson::Document`] values; a document's primary key is its
/// `_id` field.
#[derive(Debug, Clone)]
pub struct Collection<'a> {
    name: String,
    scope: Scope<'a>,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(name: String, scope: Scope<'a>) -> Self {
        Self { name, scope }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn dispatch<T, F>(&self, operation: &'static str, action: F) -> DocumentStoreResult<Completion<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Engine, &str) -> DocumentStoreResult<T> + Send + 'static,
    {
        let name = self.name.clone();
        self.scope
            .enqueue(operation, move |engine| action(engine, &name))
    }

    /// Inserts one document, resolving to its primary key.
    ///
    /// A document without an `_id` gets one assigned by the engine.
    ///
    /// # Errors
    ///
    /// Fails eagerly with [`DocumentStoreError::Disposed`] or
    /// [`DocumentStoreError::TransactionClosed`]. The completion is rejected with
    /// [`DocumentStoreError::DocumentAlreadyExists`] if the key is taken.
    pub fn insert(&self, document: BsonDocument) -> DocumentStoreResult<Completion<Bson>> {
        self.dispatch("insert", move |engine, name| {
            engine
                .insert(name, vec![document])?
                .pop()
                .ok_or_else(|| DocumentStoreError::Engine("insert returned no key".to_string()))
        })
    }

    /// Inserts documents atomically, resolving to their primary keys in input order.
    pub fn insert_many(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<Completion<Vec<Bson>>> {
        self.dispatch("insert_many", move |engine, name| engine.insert(name, documents))
    }

    /// Replaces the stored document with the same `_id`. Resolves to whether it existed.
    pub fn update(&self, document: BsonDocument) -> DocumentStoreResult<Completion<bool>> {
        self.dispatch("update", move |engine, name| {
            Ok(engine.update(name, vec![document])? > 0)
        })
    }

    /// Replaces stored documents by `_id`, resolving to the number replaced.
    pub fn update_many(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<Completion<usize>> {
        self.dispatch("update_many", move |engine, name| engine.update(name, documents))
    }

    /// Inserts or replaces one document. Resolves to `true` if it was inserted.
    pub fn upsert(&self, document: BsonDocument) -> DocumentStoreResult<Completion<bool>> {
        self.dispatch("upsert", move |engine, name| {
            Ok(engine.upsert(name, vec![document])? > 0)
        })
    }

    /// Inserts or replaces documents, resolving to the number inserted.
    pub fn upsert_many(&self, documents: Vec<BsonDocument>) -> DocumentStoreResult<Completion<usize>> {
        self.dispatch("upsert_many", move |engine, name| engine.upsert(name, documents))
    }

    /// Stores `document` under `id`, replacing any `_id` it carries.
    pub fn upsert_with_id(
        &self,
        id: impl Into<Bson>,
        mut document: BsonDocument,
    ) -> DocumentStoreResult<Completion<bool>> {
        document.insert(ID_FIELD, id.into());
        self.upsert(document)
    }

    /// Deletes a document by primary key. Resolves to whether it existed.
    pub fn delete(&self, id: impl Into<Bson>) -> DocumentStoreResult<Completion<bool>> {
        let id = id.into();
        self.dispatch("delete", move |engine, name| {
            Ok(engine.delete(name, vec![id])? > 0)
        })
    }

    /// Deletes every document matching `filter`, resolving to the number removed.
    pub fn delete_many(&self, filter: Expr) -> DocumentStoreResult<Completion<usize>> {
        self.dispatch("delete_many", move |engine, name| engine.delete_many(name, &filter))
    }

    /// Runs a find query.
    pub fn find(&self, query: Query) -> DocumentStoreResult<Completion<Vec<BsonDocument>>> {
        self.dispatch("find", move |engine, name| engine.find(name, &query))
    }

    /// Reads a document by primary key.
    pub fn find_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<Completion<Option<BsonDocument>>> {
        let id = id.into();
        self.dispatch("find_by_id", move |engine, name| engine.find_by_id(name, &id))
    }

    /// Reads the first document matching `filter` in primary key order.
    pub fn find_one(&self, filter: Expr) -> DocumentStoreResult<Completion<Option<BsonDocument>>> {
        let query = Query::builder().filter(filter).limit(1).build();
        self.dispatch("find_one", move |engine, name| {
            Ok(engine.find(name, &query)?.into_iter().next())
        })
    }

    /// Reads every document of the collection.
    pub fn find_all(&self) -> DocumentStoreResult<Completion<Vec<BsonDocument>>> {
        self.find(Query::all())
    }

    /// Counts documents matching `filter`, or all documents.
    pub fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<Completion<usize>> {
        self.dispatch("count", move |engine, name| engine.count(name, filter.as_ref()))
    }

    /// Resolves to whether any document matches `filter`.
    pub fn exists(&self, filter: Expr) -> DocumentStoreResult<Completion<bool>> {
        self.dispatch("exists", move |engine, name| {
            Ok(engine.count(name, Some(&filter))? > 0)
        })
    }

    /// Reads one page of `filter`'s matches along with the total match count.
    ///
    /// The count and the page are read in the same engine turn.
    pub fn find_page(
        &self,
        filter: Option<Expr>,
        sort: Vec<Sort>,
        params: PaginationParams,
    ) -> DocumentStoreResult<Completion<Page<BsonDocument>>> {
        self.dispatch("find_page", move |engine, name| {
            let count = engine.count(name, filter.as_ref())?;
            let items = engine.find(name, &params.query(filter, sort))?;
            Ok(params.page(items, count))
        })
    }

    /// Creates a secondary index unless an identical one exists.
    ///
    /// Resolves to `true` if the index was created.
    pub fn ensure_index(&self, index: IndexDefinition) -> DocumentStoreResult<Completion<bool>> {
        self.dispatch("ensure_index", move |engine, name| {
            index.validate()?;
            engine.ensure_index(name, index)
        })
    }

    /// Creates an index on `field`, named after it.
    pub fn ensure_index_on(&self, field: &str, unique: bool) -> DocumentStoreResult<Completion<bool>> {
        self.ensure_index(IndexDefinition::on(field).unique(unique))
    }

    /// Drops a secondary index. Resolves to whether it existed.
    pub fn drop_index(&self, index: &str) -> DocumentStoreResult<Completion<bool>> {
        let index = index.to_string();
        self.dispatch("drop_index", move |engine, name| engine.drop_index(name, &index))
    }

    /// Lists the secondary indexes of this collection.
    pub fn list_indexes(&self) -> DocumentStoreResult<Completion<Vec<IndexDefinition>>> {
        self.dispatch("list_indexes", |engine, name| engine.list_indexes(name))
    }
}

/// A collection of typed documents.
///
/// Documents are serialized on the caller's side, so a document that cannot be
/// serialized fails eagerly with [`DocumentStoreError::Serialization`] and is never
/// queued. Stored documents are deserialized on the worker; a stored document that does
/// not match `D` rejects the completion.
#[derive(Debug)]
pub struct TypedCollection<'a, D: Document> {
    collection: Collection<'a>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: Document> Clone for TypedCollection<'_, D> {
    fn clone(&self) -> Self {
        Self::new(self.collection.clone())
    }
}

impl<'a, D: Document> TypedCollection<'a, D> {
    pub(crate) fn new(collection: Collection<'a>) -> Self {
        Self {
            collection,
            _marker: PhantomData,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    /// Views the same collection with another document type.
    pub fn with_type<T: Document>(&self) -> TypedCollection<'a, T> {
        TypedCollection::new(self.collection.clone())
    }

    /// Returns the untyped view of this collection.
    pub fn untyped(&self) -> &Collection<'a> {
        &self.collection
    }

    fn serialize_all(documents: &[D]) -> DocumentStoreResult<Vec<BsonDocument>> {
        documents.iter().map(|d| d.to_document()).collect()
    }

    /// Inserts a document, resolving to its primary key.
    pub fn insert(&self, document: &D) -> DocumentStoreResult<Completion<Bson>> {
        self.collection.insert(document.to_document()?)
    }

    /// Inserts documents atomically, resolving to their primary keys in input order.
    pub fn insert_many(&self, documents: &[D]) -> DocumentStoreResult<Completion<Vec<Bson>>> {
        self.collection.insert_many(Self::serialize_all(documents)?)
    }

    /// Replaces the stored document with the same key. Resolves to whether it existed.
    pub fn update(&self, document: &D) -> DocumentStoreResult<Completion<bool>> {
        self.collection.update(document.to_document()?)
    }

    /// Replaces stored documents by key, resolving to the number replaced.
    pub fn update_many(&self, documents: &[D]) -> DocumentStoreResult<Completion<usize>> {
        self.collection.update_many(Self::serialize_all(documents)?)
    }

    /// Inserts or replaces a document. Resolves to `true` if it was inserted.
    pub fn upsert(&self, document: &D) -> DocumentStoreResult<Completion<bool>> {
        self.collection.upsert(document.to_document()?)
    }

    /// Inserts or replaces documents, resolving to the number inserted.
    pub fn upsert_many(&self, documents: &[D]) -> DocumentStoreResult<Completion<usize>> {
        self.collection.upsert_many(Self::serialize_all(documents)?)
    }

    /// Stores `document` under `id`.
    pub fn upsert_with_id(&self, id: impl Into<Bson>, document: &D) -> DocumentStoreResult<Completion<bool>> {
        self.collection.upsert_with_id(id, document.to_document()?)
    }

    /// Deletes a document by primary key. Resolves to whether it existed.
    pub fn delete(&self, id: impl Into<Bson>) -> DocumentStoreResult<Completion<bool>> {
        self.collection.delete(id)
    }

    /// Deletes every document matching `filter`.
    pub fn delete_many(&self, filter: Expr) -> DocumentStoreResult<Completion<usize>> {
        self.collection.delete_many(filter)
    }

    /// Runs a find query.
    pub fn find(&self, query: Query) -> DocumentStoreResult<Completion<Vec<D>>> {
        self.collection.dispatch("find", move |engine, name| {
            engine
                .find(name, &query)?
                .into_iter()
                .map(D::from_document)
                .collect()
        })
    }

    /// Reads a document by primary key.
    pub fn find_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<Completion<Option<D>>> {
        let id = id.into();
        self.collection.dispatch("find_by_id", move |engine, name| {
            engine
                .find_by_id(name, &id)?
                .map(D::from_document)
                .transpose()
        })
    }

    /// Reads the first document matching `filter`.
    pub fn find_one(&self, filter: Expr) -> DocumentStoreResult<Completion<Option<D>>> {
        let query = Query::builder().filter(filter).limit(1).build();
        self.collection.dispatch("find_one", move |engine, name| {
            engine
                .find(name, &query)?
                .into_iter()
                .next()
                .map(D::from_document)
                .transpose()
        })
    }

    /// Reads every document of the collection.
    pub fn find_all(&self) -> DocumentStoreResult<Completion<Vec<D>>> {
        self.find(Query::all())
    }

    /// Counts documents matching `filter`, or all documents.
    pub fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<Completion<usize>> {
        self.collection.count(filter)
    }

    /// Resolves to whether any document matches `filter`.
    pub fn exists(&self, filter: Expr) -> DocumentStoreResult<Completion<bool>> {
        self.collection.exists(filter)
    }

    /// Reads one page of `filter`'s matches along with the total match count.
    pub fn find_page(
        &self,
        filter: Option<Expr>,
        sort: Vec<Sort>,
        params: PaginationParams,
    ) -> DocumentStoreResult<Completion<Page<D>>> {
        self.collection.dispatch("find_page", move |engine, name| {
            let count = engine.count(name, filter.as_ref())?;
            let items = engine.find(name, &params.query(filter, sort))?;
            params.page(items, count).try_map(D::from_document)
        })
    }

    /// Creates a secondary index unless an identical one exists.
    pub fn ensure_index(&self, index: IndexDefinition) -> DocumentStoreResult<Completion<bool>> {
        self.collection.ensure_index(index)
    }

    /// Creates an index on `field`, named after it.
    pub fn ensure_index_on(&self, field: &str, unique: bool) -> DocumentStoreResult<Completion<bool>> {
        self.collection.ensure_index_on(field, unique)
    }

    /// Drops a secondary index.
    pub fn drop_index(&self, index: &str) -> DocumentStoreResult<Completion<bool>> {
        self.collection.drop_index(index)
    }

    /// Lists the secondary indexes of this collection.
    pub fn list_indexes(&self) -> DocumentStoreResult<Completion<Vec<IndexDefinition>>> {
        self.collection.list_indexes()
    }
}
