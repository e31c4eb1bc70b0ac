//! Query construction for find, count and delete operations.
//!
//! Queries are plain data: they are built on the caller's side, moved into a dispatched
//! operation and evaluated by the engine on the worker thread. Engines walk filter
//! expressions through the [`QueryVisitor`] trait.
//!
//! ```ignore
//! use docdispatch::query::{Filter, Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter(Filter::eq("status", "active").and(Filter::gte("age", 18)))
//!     .sort("name", SortDirection::Asc)
//!     .skip(20)
//!     .limit(10)
//!     .build();
//! ```

use bson::Bson;

use crate::{document::ID_FIELD, error::DocumentStoreError};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order.
    Desc,
}

/// One sort key. Queries apply their keys in order, later keys breaking ties.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String contains substring, or array contains element.
    Contains,
    /// Negation of [`FieldOp::Contains`].
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field (or any of its elements) matches any of the values.
    AnyOf,
    /// Field (and all of its elements) matches none of the values.
    NoneOf,
}

/// A filter expression.
///
/// Field names may be dotted paths into embedded documents (`"address.city"`).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All expressions must match.
    And(Vec<Expr>),
    /// Any expression must match.
    Or(Vec<Expr>),
    /// Inverts the inner expression.
    Not(Box<Expr>),
    /// Field presence check; `true` requires the field to exist.
    Exists(String, bool),
    /// Field comparison.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND, flattening nested ANDs.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR, flattening nested ORs.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression.
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// A find query: optional filter, sort keys, and a `skip`/`limit` window.
///
/// Without sort keys, engines return documents in primary key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Optional filter expression; `None` matches every document.
    pub filter: Option<Expr>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Number of matching documents to skip.
    pub skip: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl Query {
    /// Creates a query matching every document.
    pub fn all() -> Self {
        Query::default()
    }

    /// Creates a query with only a filter.
    pub fn filtered(filter: Expr) -> Self {
        Query { filter: Some(filter), ..Query::default() }
    }

    /// Creates a new query builder.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    /// Applies this query's `skip`/`limit` window to an already filtered and sorted sequence.
    pub fn window<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Helper for constructing filter expressions.
///
/// ```ignore
/// let expr = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    /// Matches the document whose primary key equals `id`.
    pub fn id(id: impl Into<Bson>) -> Expr {
        Expr::field(ID_FIELD.to_string(), FieldOp::Eq, id.into())
    }

    /// Field equals value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Field does not equal value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    /// Field is greater than value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    /// Field is greater than or equal to value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    /// Field is less than value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    /// Field is less than or equal to value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Field lies in the inclusive range `[low, high]`.
    pub fn between(field: impl Into<String>, low: impl Into<Bson>, high: impl Into<Bson>) -> Expr {
        let field = field.into();
        Filter::gte(field.clone(), low).and(Filter::lte(field, high))
    }

    /// String field starts with value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// String field ends with value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// String or array field contains value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// String or array field does not contain value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    /// Field exists.
    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    /// Field is missing.
    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    /// All expressions must match.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Any expression must match.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Field matches any of the given values.
    pub fn any_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, values.into())
    }

    /// Field matches none of the given values.
    pub fn none_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, values.into())
    }
}

/// Fluent builder for [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder::default()
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: Expr) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Sets the number of matching documents to skip.
    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = skip;
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}

/// Visitor over filter expressions, implemented by engines to evaluate or translate them.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
