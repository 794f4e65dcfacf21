use serde::{Deserialize, Serialize};

/// Pagination metadata attached to every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub has_next: bool,
    pub has_previous: bool,
    pub page_size: u32,
    pub total_count: Option<u64>,
}

/// One page of items in server order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination) -> Self {
        Self { items, pagination }
    }

    /// A terminal page: nothing before it, nothing after it.
    pub fn single(items: Vec<T>, page_size: u32) -> Self {
        let total = items.len() as u64;
        let page_size = if page_size == 0 {
            u32::try_from(items.len()).unwrap_or(u32::MAX)
        } else {
            page_size
        };
        Self {
            items,
            pagination: Pagination {
                page_size,
                total_count: Some(total),
                ..Pagination::default()
            },
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::default(),
        }
    }
}

/// Paging direction requested from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Next,
    Prev,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Next => "next",
            Direction::Prev => "prev",
        }
    }
}

/// Request shape handed to a page fetcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageParams<F> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    pub direction: Direction,
    #[serde(flatten)]
    pub filters: F,
}

impl<F> PageParams<F> {
    /// First page under the given filters, server-chosen page size.
    pub fn first_page(filters: F) -> Self {
        Self {
            cursor: None,
            page_size: None,
            direction: Direction::Next,
            filters,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

impl<F: Default> Default for PageParams<F> {
    fn default() -> Self {
        Self::first_page(F::default())
    }
}

/// Every list shape the API is known to return.
///
/// Decided once while decoding the response body; callers convert to
/// [`Page`] immediately.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PageResponse<T> {
    Paginated(Page<T>),
    Wrapped { items: Vec<T> },
    Bare(Vec<T>),
}

impl<T> PageResponse<T> {
    pub fn into_page(self, requested_page_size: u32) -> Page<T> {
        match self {
            PageResponse::Paginated(page) => page,
            PageResponse::Wrapped { items } | PageResponse::Bare(items) => {
                Page::single(items, requested_page_size)
            }
        }
    }

    pub fn is_paginated(&self) -> bool {
        matches!(self, PageResponse::Paginated(_))
    }
}
