//! Pagination envelope returned by `list`.
//!
//! This module provides [`ListEnvelope`], the page of rows plus the metadata a client needs to
//! navigate the remaining pages, and [`total_pages`], the page-count arithmetic it relies on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single page of results.
///
/// Serializes as `{ rows, total, page, pageSize, totalPages }`.
///
/// # Example
///
/// ```ignore
/// use datalayer::page::ListEnvelope;
///
/// let envelope = ListEnvelope::builder(vec![json!({ "id": 11 })])
///     .with_total(28)
///     .with_page(2, 10)
///     .build();
///
/// assert_eq!(envelope.total_pages, 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T = Value> {
    /// The rows of the requested page, at most `page_size` of them.
    pub rows: Vec<T>,
    /// Number of rows matching the filter across all pages.
    pub total: usize,
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of rows per page.
    pub page_size: usize,
    /// Number of pages needed to hold `total` rows.
    pub total_pages: usize,
}

impl<T> ListEnvelope<T> {
    /// Creates a new builder for an envelope holding `rows`.
    pub fn builder(rows: Vec<T>) -> ListEnvelopeBuilder<T> {
        ListEnvelopeBuilder::new(rows)
    }

    /// Whether a page follows this one.
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

impl<T> Default for ListEnvelope<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            page: 1,
            page_size: 0,
            total_pages: 0,
        }
    }
}

/// Builder for constructing [`ListEnvelope`] instances.
///
/// `total_pages` is always derived from `total` and `page_size`.
pub struct ListEnvelopeBuilder<T> {
    rows: Vec<T>,
    total: usize,
    page: usize,
    page_size: usize,
}

impl<T> ListEnvelopeBuilder<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self { rows, total: 0, page: 1, page_size: 0 }
    }

    /// Sets the number of rows across all pages.
    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total;
        self
    }

    /// Sets the page number (1-indexed) and the page size.
    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn build(self) -> ListEnvelope<T> {
        ListEnvelope {
            rows: self.rows,
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: total_pages(self.total, self.page_size),
        }
    }
}

/// `ceil(total / page_size)`; zero when `page_size` is zero.
pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }

    total.div_ceil(page_size)
}
