//! Pagination types for query results.
//!
//! [`PaginationParams`] selects a 1-indexed page of a fixed size, and [`Page`] carries
//! the entities of that page along with the total match count and navigation hints.
//! See [`Query::get_page`](crate::query::Query::get_page).

use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// A single page of query results.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// use docmodel::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Number of documents matching the query across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Converts the items while keeping the navigation metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
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

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of matching documents.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page of results to fetch.
///
/// Pages are 1-indexed (page 1 is the first page).
///
/// # Example
///
/// ```ignore
/// use docmodel::page::PaginationParams;
///
/// let params = PaginationParams::new(2, 50);
/// assert_eq!(params.offset(), 50);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    /// Creates new pagination parameters.
    ///
    /// # Arguments
    ///
    /// * `page` - The page number (1-indexed)
    /// * `per_page` - Number of items per page
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page, per_page }
    }

    pub fn builder() -> PaginationParamsBuilder {
        PaginationParamsBuilder::new()
    }

    /// Number of documents to skip to reach this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    /// Rejects page 0 and empty pages.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] if either field is zero.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        if self.page == 0 {
            return Err(DocumentStoreError::InvalidQuery("page numbers start at 1".to_string()));
        }
        if self.per_page == 0 {
            return Err(DocumentStoreError::InvalidQuery("per_page must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Builds the page holding `items` out of `count` matches overall.
    pub fn page_of<T>(&self, items: Vec<T>, count: u64) -> Page<T> {
        let seen = self.offset().saturating_add(items.len()) as u64;

        Page::builder(items)
            .with_count(count)
            .with_next_page((seen < count).then(|| self.page + 1))
            .with_previous_page((self.page > 1).then(|| self.page - 1))
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

/// Builder for constructing [`PaginationParams`] instances.
///
/// Unset values fall back to page 1 and 10 items per page.
pub struct PaginationParamsBuilder {
    page: Option<usize>,
    per_page: Option<usize>,
}

impl PaginationParamsBuilder {
    pub fn new() -> Self {
        Self { page: None, per_page: None }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn build(self) -> PaginationParams {
        PaginationParams {
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(10),
        }
    }
}

impl Default for PaginationParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
