//! Paginated query results.
//!
//! A [`Page`] is one slice of a criteria's results together with the metadata needed to
//! navigate the others. Pages are 1-indexed.
//!
//! # Example
//!
//! ```ignore
//! let page = mapper.criteria("Shape")?.sort(doc! { "color": 1 }).paginate(2, 20).await?;
//!
//! for shape in &page.items {
//!     println!("{:?}", shape.get("color"));
//! }
//!
//! if let Some(next) = page.next_page {
//!     // fetch page `next`
//! }
//! ```

use serde::{Deserialize, Serialize};

/// A single page of results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub total: u64,
    /// The number of this page (1-indexed).
    pub page: u64,
    /// The requested page size.
    pub per_page: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<u64>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<u64>,
}

impl<T> Page<T> {
    /// Builds a page, deriving the navigation metadata from the totals.
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        let next_page = if page.saturating_mul(per_page) < total {
            Some(page + 1)
        } else {
            None
        };
        let previous_page = if page > 1 { Some(page - 1) } else { None };

        Self {
            items,
            total,
            page,
            per_page,
            next_page,
            previous_page,
        }
    }

    /// The number of pages needed to hold every matching item.
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 0;
        }

        self.total.div_ceil(self.per_page)
    }

    /// Converts the items, keeping the page metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            per_page: 0,
            next_page: None,
            previous_page: None,
        }
    }
}
