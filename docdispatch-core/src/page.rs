//! Paged find results.
//!
//! A page is produced by a single dispatched operation that counts the matching
//! documents and reads the requested window in one engine turn, so the count and
//! the items always describe the same state.

use serde::{Deserialize, Serialize};

use crate::query::{Expr, Query, Sort};

/// A single page of results plus navigation metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total number of matching items across all pages.
    pub count: usize,
    /// The next page number, if more items follow.
    pub next_page: Option<usize>,
    /// The previous page number, unless this is the first page.
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    /// Converts the items of this page, keeping the metadata.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        })
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Which page to read and how large pages are. Pages are 1-indexed.
///
/// ```ignore
/// let params = PaginationParams::new(3, 20);
/// assert_eq!(params.offset(), 40);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PaginationParams {
    /// The page number (1-indexed). Page 0 is treated as page 1.
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    /// Creates new pagination parameters.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    /// Number of items to skip before this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }

    /// Builds the find query reading this page of `filter`'s matches.
    pub fn query(&self, filter: Option<Expr>, sort: Vec<Sort>) -> Query {
        Query {
            filter,
            sort,
            skip: self.offset(),
            limit: Some(self.per_page),
        }
    }

    /// Wraps the items read for this page, given the total number of matches.
    pub fn page<T>(&self, items: Vec<T>, count: usize) -> Page<T> {
        let page = self.page.max(1);
        let end = self.offset() + items.len();

        Page {
            next_page: (end < count && !items.is_empty()).then_some(page + 1),
            previous_page: (page > 1).then_some(page - 1),
            items,
            count,
        }
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_links_both_ways() {
        let params = PaginationParams::new(2, 10);
        let page = params.page((11..=20).collect::<Vec<_>>(), 100);

        assert_eq!(params.offset(), 10);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
        assert_eq!(page.count, 100);
    }

    #[test]
    fn last_page_has_no_next() {
        let params = PaginationParams::new(3, 10);
        let page = params.page(vec![21, 22], 22);

        assert_eq!(page.next_page, None);
        assert_eq!(page.previous_page, Some(2));
    }

    #[test]
    fn query_reads_the_page_window() {
        let query = PaginationParams::new(4, 25).query(None, Vec::new());

        assert_eq!(query.skip, 75);
        assert_eq!(query.limit, Some(25));
    }
}
