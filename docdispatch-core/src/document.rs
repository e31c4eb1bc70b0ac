//! Core traits for typed documents and their BSON/JSON conversions.
//!
//! Documents are stored by the engine as [`bson::Document`] values whose primary key
//! lives in the [`ID_FIELD`] (`_id`) field. Typed documents map their key with
//! `#[serde(rename = "_id")]`.

use bson::{Bson, Document as BsonDocument, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Name of the primary key field of every stored document.
pub const ID_FIELD: &str = "_id";

/// Core trait that all typed documents must implement.
///
/// A document only has to name the collection it belongs to; its primary key is whatever
/// serializes into the `_id` field. Documents serialized without an `_id` get one assigned
/// by the engine on insert.
///
/// # Example
///
/// ```ignore
/// use docdispatch::document::Document;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id")]
///     pub id: i32,
///     pub name: String,
/// }
///
/// impl Document for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
/// }
/// ```
pub trait Document: Serialize + for<'de> Deserialize<'de> + Send + Sync + 'static {
    /// Returns the name of the collection this document belongs to.
    ///
    /// The collection is created by the engine on first write.
    fn collection_name() -> &'static str;
}

/// Extension trait providing serialization utilities for documents.
///
/// Implemented for every [`Document`].
pub trait DocumentExt: Document + Sized {
    /// Converts this document to a BSON document for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the value does not serialize to a map.
    fn to_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a typed document from a stored BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored structure does not match `Self`.
    fn from_document(document: BsonDocument) -> DocumentStoreResult<Self>;

    /// Converts this document to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a document from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_document(&self) -> DocumentStoreResult<BsonDocument> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(DocumentStoreError::InvalidDocument(format!(
                "{} serialized to {:?}, expected a document",
                D::collection_name(),
                other.element_type()
            ))),
        }
    }

    fn from_document(document: BsonDocument) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Returns the primary key of a stored document, if it has one.
pub fn document_id(document: &BsonDocument) -> Option<&Bson> {
    document.get(ID_FIELD)
}

/// Looks up a possibly dotted field path (`"address.city"`) inside a document.
pub fn lookup<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(rename = "_id")]
        id: i32,
        text: String,
    }

    impl Document for Note {
        fn collection_name() -> &'static str {
            "notes"
        }
    }

    #[test]
    fn typed_document_keeps_its_id_in_the_id_field() {
        let note = Note { id: 7, text: "hello".into() };
        let document = note.to_document().unwrap();

        assert_eq!(document_id(&document), Some(&Bson::Int32(7)));
        assert_eq!(Note::from_document(document).unwrap(), note);
    }

    #[test]
    fn lookup_follows_nested_paths() {
        let document = doc! {
            "address": { "city": "Oslo" },
            "tags": ["a", "b"],
        };

        assert_eq!(lookup(&document, "address.city"), Some(&Bson::String("Oslo".into())));
        assert_eq!(lookup(&document, "tags.1"), Some(&Bson::String("b".into())));
        assert_eq!(lookup(&document, "address.zip"), None);
        assert_eq!(lookup(&document, "missing"), None);
    }
}
