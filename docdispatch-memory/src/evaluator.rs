//! Query expression evaluation for in-memory document filtering and sorting.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use docdispatch_core::{
    document::lookup,
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64. Values of different kinds are never equal and
/// have no order between them, except when sorting (see [`sort_cmp`]).
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Types the evaluator has no semantics for; never equal to anything.
    Opaque,
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Opaque,
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Opaque => 8,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders two documents by a single sort key.
///
/// Missing fields sort like null, before every other value. Values of different kinds
/// order by kind; values of the same kind without an order compare equal.
fn sort_key_cmp(left: &Document, right: &Document, sort: &Sort) -> Ordering {
    let left = lookup(left, &sort.field).map(Comparable::from).unwrap_or(Comparable::Null);
    let right = lookup(right, &sort.field).map(Comparable::from).unwrap_or(Comparable::Null);

    let ordering = left
        .partial_cmp(&right)
        .unwrap_or_else(|| left.rank().cmp(&right.rank()));

    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

/// Orders two documents by a list of sort keys, later keys breaking ties.
pub(crate) fn sort_cmp(left: &Document, right: &Document, sort: &[Sort]) -> Ordering {
    sort.iter()
        .map(|key| sort_key_cmp(left, right, key))
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Returns whether `document` satisfies `expr`.
pub(crate) fn matches(document: &Document, expr: &Expr) -> bool {
    let result: Result<bool, DocumentStoreError> = DocumentEvaluator::new(document).visit_expr(expr);
    result.unwrap_or(false)
}

/// Returns whether `document` satisfies `filter`; no filter matches everything.
pub(crate) fn matches_filter(document: &Document, filter: Option<&Expr>) -> bool {
    filter.is_none_or(|expr| matches(document, expr))
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }
}

fn any_of(field_value: Comparable<'_>, value: Comparable<'_>) -> bool {
    match (field_value, value) {
        (Comparable::Array(array), Comparable::Array(values)) => {
            values.iter().any(|val| array.iter().any(|item| item == val))
        }
        (Comparable::Array(array), single_value) => array.iter().any(|item| item == &single_value),
        (single_value, Comparable::Array(values)) => values.iter().any(|val| val == &single_value),
        _ => false,
    }
}

fn contains(field_value: Comparable<'_>, value: Comparable<'_>) -> Option<bool> {
    match (field_value, value) {
        (Comparable::Array(array), value) => Some(array.iter().any(|item| item == &value)),
        (Comparable::String(left), Comparable::String(right)) => Some(left.contains(right)),
        _ => None,
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.document, field) else {
            // A missing field only satisfies the negative operators.
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };

        let (left, right) = (Comparable::from(field_value), Comparable::from(value));

        Ok(match op {
            FieldOp::Eq => left == right,
            FieldOp::Ne => left != right,
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => match left.partial_cmp(&right) {
                Some(ordering) => match op {
                    FieldOp::Gt => ordering.is_gt(),
                    FieldOp::Gte => ordering.is_ge(),
                    FieldOp::Lt => ordering.is_lt(),
                    _ => ordering.is_le(),
                },
                None => false,
            },
            FieldOp::Contains => contains(left, right).unwrap_or(false),
            FieldOp::NotContains => !contains(left, right).unwrap_or(false),
            FieldOp::StartsWith => match (left, right) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (left, right) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => any_of(left, right),
            FieldOp::NoneOf => !any_of(left, right),
        })
    }
}
