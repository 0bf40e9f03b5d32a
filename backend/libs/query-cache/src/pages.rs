//! Paged query data
//!
//! A [`Pages`] value is what an infinite-scroll query stores under its key:
//! pages in fetch order, each carrying the cursor for the page after it.
//! Order is fixed by the first page's query and preserved by appending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::hash::Hash;

/// Position of the next page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cursor {
    /// Row offset for range-based queries
    Offset(usize),
    /// Last-seen creation timestamp
    Timestamp(DateTime<Utc>),
}

/// One fetched page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    /// `None` when this page is the last one
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// Build a page from a fetch of `page_size` rows
    ///
    /// A short page is the last page: its cursor is `None` and `next` is not called.
    pub fn from_fetch<F>(rows: Vec<T>, page_size: usize, next: F) -> Self
    where
        F: FnOnce(&[T]) -> Option<Cursor>,
    {
        let next_cursor = if page_size == 0 || rows.len() < page_size {
            None
        } else {
            next(&rows)
        };
        Self { rows, next_cursor }
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Accumulated pages of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pages<T> {
    pub pages: Vec<Page<T>>,
    pub page_size: usize,
}

impl<T> Pages<T> {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Vec::new(),
            page_size,
        }
    }

    /// Start from a first page
    pub fn first(page: Page<T>, page_size: usize) -> Self {
        Self {
            pages: vec![page],
            page_size,
        }
    }

    pub fn push(&mut self, page: Page<T>) {
        self.pages.push(page);
    }

    /// Cursor for the next fetch, `None` once the last page has arrived
    pub fn next_cursor(&self) -> Option<Cursor> {
        self.pages.last().and_then(|p| p.next_cursor)
    }

    pub fn has_next_page(&self) -> bool {
        self.next_cursor().is_some()
    }

    /// Total rows across pages
    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows in fetch order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.rows.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.pages.iter_mut().flat_map(|p| p.rows.iter_mut())
    }

    /// Append `page` without rows whose key is already cached; returns how many were dropped
    ///
    /// Rows merged from realtime can reappear in a later fetched page.
    pub fn push_distinct<K, F>(&mut self, mut page: Page<T>, key: F) -> usize
    where
        K: Eq + Hash,
        F: Fn(&T) -> K,
    {
        let seen: HashSet<K> = self.iter().map(&key).collect();
        let before = page.rows.len();
        page.rows.retain(|row| !seen.contains(&key(row)));
        let dropped = before - page.rows.len();
        self.push(page);
        dropped
    }

    /// Concatenate every page into one sequence
    pub fn into_flat(self) -> Vec<T> {
        self.pages.into_iter().flat_map(|p| p.rows).collect()
    }

    pub fn find_mut<P>(&mut self, mut pred: P) -> Option<&mut T>
    where
        P: FnMut(&T) -> bool,
    {
        self.iter_mut().find(|row| pred(row))
    }

    pub fn contains<P>(&self, mut pred: P) -> bool
    where
        P: FnMut(&T) -> bool,
    {
        self.iter().any(|row| pred(row))
    }

    /// Remove matching rows from every page, returning how many were removed
    pub fn remove_where<P>(&mut self, mut pred: P) -> usize
    where
        P: FnMut(&T) -> bool,
    {
        let before = self.len();
        for page in &mut self.pages {
            page.rows.retain(|row| !pred(row));
        }
        before - self.len()
    }

    /// Insert at the head of the first page
    pub fn prepend(&mut self, row: T) {
        match self.pages.first_mut() {
            Some(page) => page.rows.insert(0, row),
            None => self.pages.push(Page {
                rows: vec![row],
                next_cursor: None,
            }),
        }
    }

    /// Insert at the tail of the last page
    pub fn append(&mut self, row: T) {
        match self.pages.last_mut() {
            Some(page) => page.rows.push(row),
            None => self.pages.push(Page {
                rows: vec![row],
                next_cursor: None,
            }),
        }
    }
}

impl<T> Default for Pages<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_page_is_last() {
        let mut called = false;
        let page = Page::from_fetch(vec![1, 2], 3, |_| {
            called = true;
            Some(Cursor::Offset(3))
        });
        assert!(page.is_last());
        assert!(!called);
    }

    #[test]
    fn test_full_page_carries_cursor() {
        let page = Page::from_fetch(vec![1, 2, 3], 3, |rows| Some(Cursor::Offset(rows.len())));
        assert_eq!(page.next_cursor, Some(Cursor::Offset(3)));
    }

    #[test]
    fn test_flatten_keeps_fetch_order() {
        let mut pages = Pages::first(
            Page {
                rows: vec![3, 1],
                next_cursor: Some(Cursor::Offset(2)),
            },
            2,
        );
        pages.push(Page {
            rows: vec![2],
            next_cursor: None,
        });
        assert!(!pages.has_next_page());
        assert_eq!(pages.into_flat(), vec![3, 1, 2]);
    }

    #[test]
    fn test_remove_where_spans_pages() {
        let mut pages = Pages::first(
            Page {
                rows: vec![1, 2],
                next_cursor: Some(Cursor::Offset(2)),
            },
            2,
        );
        pages.push(Page {
            rows: vec![2, 3],
            next_cursor: None,
        });
        assert_eq!(pages.remove_where(|r| *r == 2), 2);
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_push_distinct_drops_cached_rows() {
        let mut pages = Pages::first(
            Page {
                rows: vec![1, 2, 9],
                next_cursor: Some(Cursor::Offset(2)),
            },
            2,
        );
        let dropped = pages.push_distinct(
            Page {
                rows: vec![3, 9],
                next_cursor: None,
            },
            |r| *r,
        );
        assert_eq!(dropped, 1);
        assert!(!pages.has_next_page());
        assert_eq!(pages.into_flat(), vec![1, 2, 9, 3]);
    }

    #[test]
    fn test_prepend_and_append_on_empty() {
        let mut pages: Pages<u8> = Pages::new(10);
        pages.prepend(1);
        pages.append(2);
        assert_eq!(pages.pages.len(), 1);
        assert_eq!(pages.into_flat(), vec![1, 2]);
    }

    #[test]
    fn test_cursor_serialization_shape() {
        let json = serde_json::to_value(Cursor::Offset(20)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "offset", "value": 20}));
    }
}
