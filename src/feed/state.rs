use std::collections::HashSet;

use eventfeed_api_types::{Page, Pagination};

use super::FeedItem;

/// Page size requested when the caller does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Observable state of one feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState<T> {
    /// Unique by id, in load order.
    pub items: Vec<T>,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<String>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub has_next: bool,
    pub has_previous: bool,
    pub page_size: u32,
    pub total_count: Option<u64>,
    pub has_fetched: bool,
}

impl<T> Default for FeedState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            loading_more: false,
            error: None,
            next_cursor: None,
            prev_cursor: None,
            has_next: false,
            has_previous: false,
            page_size: DEFAULT_PAGE_SIZE,
            total_count: None,
            has_fetched: false,
        }
    }
}

/// Coarse state derived from the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    Idle,
    Loading,
    LoadingMore,
    Error,
}

/// What happened to a feed operation's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// The page was written to the state.
    Applied,
    /// The fetch failed and the feed's error was set.
    Failed,
    /// A newer request or a reset superseded this one; nothing was written.
    Stale,
    /// The operation's preconditions did not hold; nothing was fetched.
    Skipped,
}

impl FeedOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, FeedOutcome::Applied)
    }
}

impl<T> FeedState<T> {
    pub fn status(&self) -> FeedStatus {
        if self.loading {
            FeedStatus::Loading
        } else if self.loading_more {
            FeedStatus::LoadingMore
        } else if self.error.is_some() {
            FeedStatus::Error
        } else {
            FeedStatus::Idle
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn apply_pagination(&mut self, pagination: Pagination) {
        self.next_cursor = pagination.next_cursor;
        self.prev_cursor = pagination.prev_cursor;
        self.has_next = pagination.has_next;
        self.has_previous = pagination.has_previous;
        if pagination.page_size > 0 {
            self.page_size = pagination.page_size;
        }
        self.total_count = pagination.total_count;
    }
}

impl<T: FeedItem> FeedState<T> {
    pub(super) fn begin_load(&mut self) {
        self.loading = true;
        self.loading_more = false;
        self.error = None;
    }

    pub(super) fn replace_page(&mut self, page: Page<T>) {
        let mut seen = HashSet::with_capacity(page.items.len());
        self.items = page
            .items
            .into_iter()
            .filter(|item| seen.insert(item.id()))
            .collect();
        self.apply_pagination(page.pagination);
        self.loading = false;
        self.error = None;
        self.has_fetched = true;
    }

    /// Appends items not already present and takes over the new cursors.
    pub(super) fn append_page(&mut self, page: Page<T>) -> usize {
        let mut seen: HashSet<T::Id> = self.items.iter().map(FeedItem::id).collect();
        let before = self.items.len();
        self.items.extend(
            page.items
                .into_iter()
                .filter(|item| seen.insert(item.id())),
        );
        self.apply_pagination(page.pagination);
        self.loading_more = false;
        self.error = None;
        self.items.len() - before
    }

    pub(super) fn prepend(&mut self, item: T) {
        let id = item.id();
        match self.items.iter().position(|existing| existing.id() == id) {
            Some(index) => {
                self.items.remove(index);
                self.items.insert(0, item);
            }
            None => {
                self.items.insert(0, item);
                if let Some(total) = self.total_count.as_mut() {
                    *total += 1;
                }
            }
        }
    }

    pub(super) fn remove(&mut self, id: &T::Id) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != *id);
        let removed = self.items.len() != before;
        if removed {
            if let Some(total) = self.total_count.as_mut() {
                *total = total.saturating_sub(1);
            }
        }
        removed
    }
}
