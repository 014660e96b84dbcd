//! Fixed-size pagination over an in-memory list.

use crate::error::Result;
use crate::storage::{KeyValueStore, keys};

/// Page size of the gallery view.
pub const GALLERY_PAGE_SIZE: usize = 20;

/// Page size of the all-wallpapers view.
pub const WALLPAPERS_PAGE_SIZE: usize = 32;

/// Page cursor over `total_items` items.
///
/// `current` always lies in `[1, max(total_pages, 1)]`; out-of-range
/// requests are clamped to the nearest bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    current: usize,
    per_page: usize,
    total_items: usize,
}

impl Paginator {
    /// Creates a paginator on page 1. A zero page size is treated as 1.
    #[must_use]
    pub fn new(total_items: usize, per_page: usize) -> Self {
        Self {
            current: 1,
            per_page: per_page.max(1),
            total_items,
        }
    }

    /// Current page, 1-indexed.
    #[must_use]
    pub const fn current_page(&self) -> usize {
        self.current
    }

    /// Items per page.
    #[must_use]
    pub const fn per_page(&self) -> usize {
        self.per_page
    }

    /// `ceil(total_items / per_page)`; zero for an empty list.
    #[must_use]
    pub const fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.per_page)
    }

    const fn last_page(&self) -> usize {
        let pages = self.total_pages();
        if pages == 0 { 1 } else { pages }
    }

    /// Jumps to page `n`, clamped into range. Returns the resulting page.
    pub fn set_page(&mut self, n: usize) -> usize {
        self.current = n.clamp(1, self.last_page());
        self.current
    }

    /// Updates the item count (e.g. after a refetch) and re-clamps.
    pub fn set_total_items(&mut self, total_items: usize) {
        self.total_items = total_items;
        self.set_page(self.current);
    }

    /// Returns `true` if there is a next page.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.current < self.last_page()
    }

    /// Returns `true` if there is a previous page.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.current > 1
    }

    /// Moves forward one page. Returns `false` when already on the last page.
    pub fn next(&mut self) -> bool {
        if self.has_next() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Moves back one page. Returns `false` when already on the first page.
    pub fn previous(&mut self) -> bool {
        if self.has_previous() {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Returns the current page's slice of `items`.
    #[must_use]
    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let len = items.len().min(self.total_items);
        let start = ((self.current - 1) * self.per_page).min(len);
        let end = (self.current * self.per_page).min(len);
        &items[start..end]
    }

    /// Restores the page saved under `currentPage`, clamped. Missing or
    /// unparsable values leave the paginator on page 1.
    pub fn restore<S: KeyValueStore + ?Sized>(&mut self, store: &S) -> usize {
        if let Some(page) = store
            .get(keys::CURRENT_PAGE)
            .and_then(|raw| raw.trim().parse::<usize>().ok())
        {
            self.set_page(page);
        }
        self.current
    }

    /// Saves the current page under `currentPage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<()> {
        store.set(keys::CURRENT_PAGE, &self.current.to_string())
    }
}
