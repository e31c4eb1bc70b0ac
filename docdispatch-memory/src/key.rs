//! Primary keys of stored documents.

use std::cmp::Ordering;

use bson::Bson;

use docdispatch_core::error::{DocumentStoreError, DocumentStoreResult};

/// Totally ordered form of an `_id` value.
///
/// Keys of different types order by type first (booleans, numbers, strings, object ids,
/// dates, binaries), then by value. All numeric types share one key space, so `1`, `1i64`
/// and `1.0` name the same document.
#[derive(Debug, Clone)]
pub(crate) enum DocumentKey {
    Bool(bool),
    Number(f64),
    String(String),
    ObjectId([u8; 12]),
    DateTime(i64),
    Binary(Vec<u8>),
}

impl DocumentKey {
    fn rank(&self) -> u8 {
        match self {
            DocumentKey::Bool(_) => 0,
            DocumentKey::Number(_) => 1,
            DocumentKey::String(_) => 2,
            DocumentKey::ObjectId(_) => 3,
            DocumentKey::DateTime(_) => 4,
            DocumentKey::Binary(_) => 5,
        }
    }
}

impl TryFrom<&Bson> for DocumentKey {
    type Error = DocumentStoreError;

    fn try_from(value: &Bson) -> DocumentStoreResult<Self> {
        let key = match value {
            Bson::Boolean(value) => DocumentKey::Bool(*value),
            Bson::Int32(value) => DocumentKey::Number(*value as f64),
            Bson::Int64(value) => DocumentKey::Number(*value as f64),
            Bson::Double(value) if value.is_nan() => {
                return Err(DocumentStoreError::InvalidDocument("_id must not be NaN".to_string()));
            }
            // -0.0 and 0.0 are the same key
            Bson::Double(value) => DocumentKey::Number(value + 0.0),
            Bson::String(value) => DocumentKey::String(value.clone()),
            Bson::ObjectId(value) => DocumentKey::ObjectId(value.bytes()),
            Bson::DateTime(value) => DocumentKey::DateTime(value.timestamp_millis()),
            Bson::Binary(value) => DocumentKey::Binary(value.bytes.clone()),
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "unsupported _id type {:?}",
                    other.element_type()
                )));
            }
        };

        Ok(key)
    }
}

impl Ord for DocumentKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DocumentKey::Bool(a), DocumentKey::Bool(b)) => a.cmp(b),
            (DocumentKey::Number(a), DocumentKey::Number(b)) => a.total_cmp(b),
            (DocumentKey::String(a), DocumentKey::String(b)) => a.cmp(b),
            (DocumentKey::ObjectId(a), DocumentKey::ObjectId(b)) => a.cmp(b),
            (DocumentKey::DateTime(a), DocumentKey::DateTime(b)) => a.cmp(b),
            (DocumentKey::Binary(a), DocumentKey::Binary(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for DocumentKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DocumentKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DocumentKey {}
