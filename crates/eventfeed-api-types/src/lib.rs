//! Shared page, filter and item types exchanged with the events API.
//!
//! The feed layer only ever sees [`Page`]; the wire shapes the API has
//! historically returned are folded into it by [`PageResponse::into_page`].

mod filters;
mod items;
mod page;

pub use filters::{EventFilters, Location, UserFilters};
pub use items::{EventSummary, UserSummary};
pub use page::{Direction, Page, PageParams, PageResponse, Pagination};
