//! In-memory engine implementation.
//!
//! Collections keep their documents in primary key order. Secondary indexes are
//! definitions only: lookups scan, and unique indexes are enforced by checking every
//! write against the stored documents.

use std::collections::BTreeMap;

use bson::{Bson, Document, oid::ObjectId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use docdispatch_core::{
    document::{ID_FIELD, document_id, lookup},
    engine::{Engine, EngineBuilder, IndexDefinition, PRIMARY_INDEX},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Query},
};

use crate::{
    evaluator::{Comparable, matches_filter, sort_cmp},
    key::DocumentKey,
};

#[derive(Debug, Clone, Default)]
struct CollectionState {
    documents: BTreeMap<DocumentKey, Document>,
    indexes: BTreeMap<String, IndexDefinition>,
}

impl CollectionState {
    fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.indexes.is_empty()
    }

    /// Fails if `document` collides with a stored document on any unique index.
    ///
    /// Documents without the indexed field are not indexed.
    fn check_unique(&self, collection: &str, document: &Document, own_key: Option<&DocumentKey>) -> DocumentStoreResult<()> {
        for index in self.indexes.values().filter(|index| index.unique) {
            let Some(value) = lookup(document, &index.field) else {
                continue;
            };
            let value = Comparable::from(value);

            let collides = self
                .documents
                .iter()
                .filter(|(key, _)| Some(*key) != own_key)
                .filter_map(|(_, other)| lookup(other, &index.field))
                .any(|other| Comparable::from(other) == value);

            if collides {
                return Err(duplicate_key(index, collection, lookup(document, &index.field)));
            }
        }

        Ok(())
    }

    fn insert_new(&mut self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        let (id, document) = with_id(document);
        let key = DocumentKey::try_from(&id)?;

        if self.documents.contains_key(&key) {
            return Err(DocumentStoreError::DocumentAlreadyExists(
                id.to_string(),
                collection.to_string(),
            ));
        }

        self.check_unique(collection, &document, None)?;
        self.documents.insert(key, document);

        Ok(id)
    }

    fn replace(&mut self, collection: &str, key: DocumentKey, document: Document) -> DocumentStoreResult<()> {
        self.check_unique(collection, &document, Some(&key))?;
        self.documents.insert(key, document);

        Ok(())
    }

    fn matching<'a>(&'a self, filter: Option<&'a Expr>) -> impl Iterator<Item = &'a Document> + 'a {
        self.documents
            .values()
            .filter(move |document| matches_filter(document, filter))
    }
}

fn duplicate_key(index: &IndexDefinition, collection: &str, key: Option<&Bson>) -> DocumentStoreError {
    DocumentStoreError::DuplicateKey {
        index: index.name.clone(),
        collection: collection.to_string(),
        key: key.map(Bson::to_string).unwrap_or_default(),
    }
}

/// Returns the document's `_id`, assigning a new [`ObjectId`] first if it has none.
fn with_id(document: Document) -> (Bson, Document) {
    if let Some(id) = document_id(&document) {
        return (id.clone(), document);
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut assigned = Document::new();
    assigned.insert(ID_FIELD, id.clone());

    for (field, value) in document {
        assigned.insert(field, value);
    }

    (id, assigned)
}

fn existing_key(collection: &str, document: &Document) -> DocumentStoreResult<DocumentKey> {
    match document_id(document) {
        Some(id) => DocumentKey::try_from(id),
        None => Err(DocumentStoreError::InvalidDocument(format!(
            "document in {collection} has no {ID_FIELD}"
        ))),
    }
}

/// Configuration of a [`MemoryEngine`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryEngineOptions {
    /// Maximum number of documents a single collection may hold.
    pub max_documents_per_collection: Option<usize>,
}

/// A synchronous, single-threaded, in-memory document engine.
///
/// Every call applies all of its changes or none of them: writes run against a copy of
/// the target collection which replaces the stored one only on success.
///
/// Explicit transactions snapshot the whole engine on begin; rollback restores the
/// snapshot and commit discards it. Only one transaction can be open at a time.
///
/// # Example
///
/// ```ignore
/// use docdispatch_memory::MemoryEngine;
/// use docdispatch::database::Database;
///
/// let engine = MemoryEngine::builder()
///     .max_documents_per_collection(10_000)
///     .build()?;
/// let database = Database::open(engine)?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    collections: BTreeMap<String, CollectionState>,
    snapshot: Option<BTreeMap<String, CollectionState>>,
    options: MemoryEngineOptions,
}

impl MemoryEngine {
    /// Creates an empty engine with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty engine with the given options.
    pub fn with_options(options: MemoryEngineOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Creates a builder for an engine with custom options.
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::default()
    }

    /// Returns whether an explicit transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn collection(&self, name: &str) -> Option<&CollectionState> {
        self.collections.get(name)
    }

    /// Runs `write` against a copy of the collection and stores the copy if it succeeds.
    ///
    /// The whole collection is cloned first, so even a single-document insert costs O(n)
    /// in the collection size. A failed batch leaves the stored collection untouched.
    fn write<T>(
        &mut self,
        name: &str,
        write: impl FnOnce(&mut CollectionState) -> DocumentStoreResult<T>,
    ) -> DocumentStoreResult<T> {
        let existed = self.collections.contains_key(name);
        let mut working = self.collections.get(name).cloned().unwrap_or_default();

        let result = write(&mut working)?;

        if let Some(max) = self.options.max_documents_per_collection {
            if working.documents.len() > max {
                return Err(DocumentStoreError::CollectionFull(name.to_string(), max));
            }
        }

        if existed || !working.is_empty() {
            self.collections.insert(name.to_string(), working);
        }

        Ok(result)
    }
}

impl Engine for MemoryEngine {
    fn insert(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        self.write(collection, |state| {
            documents
                .into_iter()
                .map(|document| state.insert_new(collection, document))
                .collect()
        })
    }

    fn update(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<usize> {
        self.write(collection, |state| {
            let mut replaced = 0;

            for document in documents {
                let key = existing_key(collection, &document)?;

                if state.documents.contains_key(&key) {
                    state.replace(collection, key, document)?;
                    replaced += 1;
                }
            }

            Ok(replaced)
        })
    }

    fn upsert(&mut self, collection: &str, documents: Vec<Document>) -> DocumentStoreResult<usize> {
        self.write(collection, |state| {
            let mut inserted = 0;

            for document in documents {
                let key = match document_id(&document) {
                    Some(id) => Some(DocumentKey::try_from(id)?),
                    None => None,
                };

                match key {
                    Some(key) if state.documents.contains_key(&key) => {
                        state.replace(collection, key, document)?;
                    }
                    _ => {
                        state.insert_new(collection, document)?;
                        inserted += 1;
                    }
                }
            }

            Ok(inserted)
        })
    }

    fn delete(&mut self, collection: &str, ids: Vec<Bson>) -> DocumentStoreResult<usize> {
        if self.collection(collection).is_none() {
            return Ok(0);
        }

        self.write(collection, |state| {
            Ok(ids
                .iter()
                .filter_map(|id| DocumentKey::try_from(id).ok())
                .filter(|key| state.documents.remove(key).is_some())
                .count())
        })
    }

    fn delete_many(&mut self, collection: &str, filter: &Expr) -> DocumentStoreResult<usize> {
        if self.collection(collection).is_none() {
            return Ok(0);
        }

        self.write(collection, |state| {
            let before = state.documents.len();
            state
                .documents
                .retain(|_, document| !matches_filter(document, Some(filter)));

            Ok(before - state.documents.len())
        })
    }

    fn find(&self, collection: &str, query: &Query) -> DocumentStoreResult<Vec<Document>> {
        let Some(state) = self.collection(collection) else {
            return Ok(Vec::new());
        };

        let mut documents = state.matching(query.filter.as_ref()).collect::<Vec<_>>();

        if !query.sort.is_empty() {
            documents.sort_by(|left, right| sort_cmp(left, right, &query.sort));
        }

        Ok(query.window(documents.into_iter().cloned()))
    }

    fn find_by_id(&self, collection: &str, id: &Bson) -> DocumentStoreResult<Option<Document>> {
        let Ok(key) = DocumentKey::try_from(id) else {
            return Ok(None);
        };

        Ok(self
            .collection(collection)
            .and_then(|state| state.documents.get(&key))
            .cloned())
    }

    fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<usize> {
        Ok(self
            .collection(collection)
            .map(|state| state.matching(filter).count())
            .unwrap_or(0))
    }

    fn ensure_index(&mut self, collection: &str, index: IndexDefinition) -> DocumentStoreResult<bool> {
        index.validate()?;

        if let Some(existing) = self.collection(collection).and_then(|state| state.indexes.get(&index.name)) {
            if *existing == index {
                return Ok(false);
            }

            return Err(DocumentStoreError::InvalidIndex(format!(
                "index {} already exists on {collection} with another definition",
                index.name
            )));
        }

        self.write(collection, |state| {
            if index.unique {
                let mut seen: Vec<&Bson> = Vec::new();

                for value in state.documents.values().filter_map(|document| lookup(document, &index.field)) {
                    let candidate = Comparable::from(value);
                    if seen.iter().any(|other| Comparable::from(*other) == candidate) {
                        return Err(duplicate_key(&index, collection, Some(value)));
                    }
                    seen.push(value);
                }
            }

            debug!(collection, index = %index.name, unique = index.unique, "index created");
            state.indexes.insert(index.name.clone(), index);

            Ok(true)
        })
    }

    fn drop_index(&mut self, collection: &str, name: &str) -> DocumentStoreResult<bool> {
        if name == PRIMARY_INDEX {
            return Err(DocumentStoreError::InvalidIndex(format!(
                "the {PRIMARY_INDEX} index cannot be dropped"
            )));
        }

        match self.collections.get_mut(collection) {
            Some(state) => Ok(state.indexes.remove(name).is_some()),
            None => Ok(false),
        }
    }

    fn list_indexes(&self, collection: &str) -> DocumentStoreResult<Vec<IndexDefinition>> {
        Ok(self
            .collection(collection)
            .map(|state| state.indexes.values().cloned().collect())
            .unwrap_or_default())
    }

    fn collection_names(&self) -> DocumentStoreResult<Vec<String>> {
        Ok(self.collections.keys().cloned().collect())
    }

    fn drop_collection(&mut self, name: &str) -> DocumentStoreResult<bool> {
        Ok(self.collections.remove(name).is_some())
    }

    fn rename_collection(&mut self, name: &str, new_name: &str) -> DocumentStoreResult<bool> {
        if !self.collections.contains_key(name) {
            return Ok(false);
        }

        if self.collections.contains_key(new_name) {
            return Err(DocumentStoreError::CollectionAlreadyExists(new_name.to_string()));
        }

        if let Some(state) = self.collections.remove(name) {
            self.collections.insert(new_name.to_string(), state);
        }

        Ok(true)
    }

    fn begin_transaction(&mut self) -> DocumentStoreResult<bool> {
        if self.snapshot.is_some() {
            return Ok(false);
        }

        self.snapshot = Some(self.collections.clone());
        Ok(true)
    }

    fn commit(&mut self) -> DocumentStoreResult<bool> {
        Ok(self.snapshot.take().is_some())
    }

    fn rollback(&mut self) -> DocumentStoreResult<bool> {
        match self.snapshot.take() {
            Some(snapshot) => {
                self.collections = snapshot;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn close(mut self: Box<Self>) -> DocumentStoreResult<()> {
        if self.rollback()? {
            debug!("rolled back open transaction on close");
        }

        Ok(())
    }
}

/// Builder for [`MemoryEngine`] instances.
///
/// ```ignore
/// use docdispatch_memory::MemoryEngine;
///
/// let engine = MemoryEngine::builder().max_documents_per_collection(100).build()?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngineBuilder {
    options: MemoryEngineOptions,
}

impl MemoryEngineBuilder {
    /// Limits how many documents each collection may hold.
    pub fn max_documents_per_collection(mut self, max: usize) -> Self {
        self.options.max_documents_per_collection = Some(max);
        self
    }

    /// Replaces all options, e.g. with ones loaded from a configuration file.
    pub fn options(mut self, options: MemoryEngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Initialization`] for a zero document limit.
    pub fn build(self) -> DocumentStoreResult<MemoryEngine> {
        if self.options.max_documents_per_collection == Some(0) {
            return Err(DocumentStoreError::Initialization(
                "max_documents_per_collection must be greater than zero".to_string(),
            ));
        }

        Ok(MemoryEngine::with_options(self.options))
    }
}

impl EngineBuilder for MemoryEngineBuilder {
    type Engine = MemoryEngine;

    fn build(self) -> DocumentStoreResult<Self::Engine> {
        MemoryEngineBuilder::build(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docdispatch_core::query::{Filter, SortDirection};

    fn engine_with_people() -> MemoryEngine {
        let mut engine = MemoryEngine::new();
        engine
            .insert(
                "people",
                vec![
                    doc! { "_id": 3, "name": "Carol", "age": 41 },
                    doc! { "_id": 1, "name": "Alice", "age": 30 },
                    doc! { "_id": 2, "name": "Bob", "age": 25 },
                ],
            )
            .unwrap();
        engine
    }

    fn ids(documents: &[Document]) -> Vec<i32> {
        documents
            .iter()
            .map(|document| document.get_i32(ID_FIELD).unwrap())
            .collect()
    }

    #[test]
    fn find_defaults_to_primary_key_order() {
        let engine = engine_with_people();
        let found = engine.find("people", &Query::all()).unwrap();

        assert_eq!(ids(&found), vec![1, 2, 3]);
    }

    #[test]
    fn find_sorts_filters_and_windows() {
        let engine = engine_with_people();
        let query = Query::builder()
            .filter(Filter::gte("age", 25))
            .sort("age", SortDirection::Desc)
            .skip(1)
            .limit(1)
            .build();

        assert_eq!(ids(&engine.find("people", &query).unwrap()), vec![1]);
    }

    #[test]
    fn insert_assigns_object_id_first() {
        let mut engine = MemoryEngine::new();
        let ids = engine.insert("notes", vec![doc! { "text": "hi" }]).unwrap();

        assert!(matches!(ids[0], Bson::ObjectId(_)));

        let stored = engine.find_by_id("notes", &ids[0]).unwrap().unwrap();
        assert_eq!(stored.keys().next().map(String::as_str), Some(ID_FIELD));
    }

    #[test]
    fn failed_batch_leaves_collection_untouched() {
        let mut engine = engine_with_people();
        let result = engine.insert(
            "people",
            vec![doc! { "_id": 4, "name": "Dan" }, doc! { "_id": 1, "name": "Again" }],
        );

        assert!(matches!(result, Err(DocumentStoreError::DocumentAlreadyExists(_, _))));
        assert_eq!(engine.count("people", None).unwrap(), 3);
        assert!(engine.find_by_id("people", &Bson::Int32(4)).unwrap().is_none());
    }

    #[test]
    fn update_skips_unknown_ids_and_upsert_counts_inserts() {
        let mut engine = engine_with_people();

        let replaced = engine
            .update("people", vec![doc! { "_id": 1, "name": "Alicia" }, doc! { "_id": 9 }])
            .unwrap();
        assert_eq!(replaced, 1);

        let inserted = engine
            .upsert("people", vec![doc! { "_id": 2, "name": "Bobby" }, doc! { "_id": 5, "name": "Eve" }])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(engine.count("people", None).unwrap(), 4);
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let mut engine = engine_with_people();
        assert!(engine.ensure_index("people", IndexDefinition::on("name").unique(true)).unwrap());
        assert!(!engine.ensure_index("people", IndexDefinition::on("name").unique(true)).unwrap());

        let result = engine.insert("people", vec![doc! { "_id": 7, "name": "Bob" }]);
        assert!(matches!(result, Err(DocumentStoreError::DuplicateKey { .. })));

        // Replacing a document with its own key value is fine.
        assert_eq!(engine.update("people", vec![doc! { "_id": 2, "name": "Bob", "age": 26 }]).unwrap(), 1);
    }

    #[test]
    fn unique_index_cannot_be_built_over_duplicates() {
        let mut engine = MemoryEngine::new();
        engine
            .insert("tags", vec![doc! { "_id": 1, "label": "x" }, doc! { "_id": 2, "label": "x" }])
            .unwrap();

        let result = engine.ensure_index("tags", IndexDefinition::on("label").unique(true));
        assert!(matches!(result, Err(DocumentStoreError::DuplicateKey { .. })));
        assert!(engine.list_indexes("tags").unwrap().is_empty());
    }

    #[test]
    fn index_name_conflicts_and_primary_index() {
        let mut engine = MemoryEngine::new();
        engine.ensure_index("c", IndexDefinition::new("by_a", "a")).unwrap();

        assert!(matches!(
            engine.ensure_index("c", IndexDefinition::new("by_a", "b")),
            Err(DocumentStoreError::InvalidIndex(_))
        ));
        assert!(matches!(engine.drop_index("c", "_id"), Err(DocumentStoreError::InvalidIndex(_))));
        assert!(engine.drop_index("c", "by_a").unwrap());
        assert!(!engine.drop_index("c", "by_a").unwrap());
    }

    #[test]
    fn transaction_rollback_restores_snapshot() {
        let mut engine = engine_with_people();

        assert!(engine.begin_transaction().unwrap());
        assert!(!engine.begin_transaction().unwrap());

        engine.delete("people", vec![Bson::Int32(1)]).unwrap();
        engine.insert("other", vec![doc! { "_id": 1 }]).unwrap();

        assert!(engine.rollback().unwrap());
        assert_eq!(engine.count("people", None).unwrap(), 3);
        assert_eq!(engine.collection_names().unwrap(), vec!["people".to_string()]);
        assert!(!engine.commit().unwrap());
    }

    #[test]
    fn collection_limit_is_enforced() {
        let mut engine = MemoryEngine::builder().max_documents_per_collection(2).build().unwrap();
        engine.insert("c", vec![doc! { "_id": 1 }, doc! { "_id": 2 }]).unwrap();

        assert_eq!(
            engine.insert("c", vec![doc! { "_id": 3 }]),
            Err(DocumentStoreError::CollectionFull("c".to_string(), 2))
        );
        assert!(MemoryEngine::builder().max_documents_per_collection(0).build().is_err());
    }

    #[test]
    fn rename_and_drop_collections() {
        let mut engine = engine_with_people();
        engine.insert("archive", vec![doc! { "_id": 1 }]).unwrap();

        assert!(matches!(
            engine.rename_collection("people", "archive"),
            Err(DocumentStoreError::CollectionAlreadyExists(_))
        ));
        assert!(engine.rename_collection("people", "staff").unwrap());
        assert!(!engine.rename_collection("people", "x").unwrap());
        assert_eq!(engine.count("staff", None).unwrap(), 3);

        assert!(engine.drop_collection("staff").unwrap());
        assert!(!engine.drop_collection("staff").unwrap());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: MemoryEngineOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, MemoryEngineOptions::default());

        let options: MemoryEngineOptions =
            serde_json::from_str(r#"{"max_documents_per_collection": 5}"#).unwrap();
        assert_eq!(options.max_documents_per_collection, Some(5));
    }
}
