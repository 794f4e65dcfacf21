//! Cursor-paginated feeds.
//!
//! A [`Feed`] turns a pair of page fetchers into a list that can be loaded,
//! extended, refreshed, reset and edited locally. [`FeedHub`] owns one
//! independent feed per [`FeedKind`].

mod cached;
mod fetcher;
mod hub;
mod machine;
mod state;
mod tracked;

use std::fmt;
use std::hash::Hash;

use eventfeed_api_types::{EventSummary, UserSummary};
use uuid::Uuid;

use crate::cache::CacheFamily;

pub use cached::CachedFetcher;
pub use fetcher::{FnFetcher, PageFetcher};
pub use hub::{FeedHub, FeedSources};
pub use machine::Feed;
pub use state::{DEFAULT_PAGE_SIZE, FeedOutcome, FeedState, FeedStatus};
pub use tracked::TrackedFeed;

/// An item with a stable identity, used to deduplicate pages.
pub trait FeedItem: Clone + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync;

    fn id(&self) -> Self::Id;
}

impl FeedItem for EventSummary {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl FeedItem for UserSummary {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Every feed the client keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeedKind {
    Events,
    Created,
    Rsvped,
    Organized,
    Moderated,
    Nearby,
    AdminUsers,
    AdminEvents,
}

impl FeedKind {
    pub const ALL: [FeedKind; 8] = [
        FeedKind::Events,
        FeedKind::Created,
        FeedKind::Rsvped,
        FeedKind::Organized,
        FeedKind::Moderated,
        FeedKind::Nearby,
        FeedKind::AdminUsers,
        FeedKind::AdminEvents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Events => "events",
            FeedKind::Created => "created",
            FeedKind::Rsvped => "rsvped",
            FeedKind::Organized => "organized",
            FeedKind::Moderated => "moderated",
            FeedKind::Nearby => "nearby",
            FeedKind::AdminUsers => "admin_users",
            FeedKind::AdminEvents => "admin_events",
        }
    }

    /// Message stored in the feed state when a fetch fails.
    pub fn failure_message(&self) -> &'static str {
        match self {
            FeedKind::Events => "Failed to fetch events",
            FeedKind::Created => "Failed to fetch created events",
            FeedKind::Rsvped => "Failed to fetch RSVP'd events",
            FeedKind::Organized => "Failed to fetch organized events",
            FeedKind::Moderated => "Failed to fetch moderated events",
            FeedKind::Nearby => "Failed to fetch nearby events",
            FeedKind::AdminUsers => "Failed to fetch users",
            FeedKind::AdminEvents => "Failed to fetch admin events",
        }
    }

    /// Cache family of the feed's pages, if they are cached.
    pub fn cache_family(&self) -> Option<CacheFamily> {
        match self {
            FeedKind::Events => Some(CacheFamily::Events),
            FeedKind::Nearby => Some(CacheFamily::NearbyEvents),
            FeedKind::AdminUsers => Some(CacheFamily::AdminUsers),
            FeedKind::AdminEvents => Some(CacheFamily::AdminEvents),
            FeedKind::Created | FeedKind::Rsvped | FeedKind::Organized | FeedKind::Moderated => {
                None
            }
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeedKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        FeedKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.replace('-', "_"))
            .ok_or_else(|| format!("unknown feed `{value}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_kinds_parse_from_cli_spelling() {
        assert_eq!("admin-users".parse::<FeedKind>(), Ok(FeedKind::AdminUsers));
        assert_eq!("rsvped".parse::<FeedKind>(), Ok(FeedKind::Rsvped));
        assert!("friends".parse::<FeedKind>().is_err());
    }

    #[test]
    fn every_feed_has_its_own_failure_message() {
        let mut messages: Vec<_> = FeedKind::ALL.iter().map(FeedKind::failure_message).collect();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), FeedKind::ALL.len());
        assert_eq!(
            FeedKind::Created.failure_message(),
            "Failed to fetch created events"
        );
    }
}
