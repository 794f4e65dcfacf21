//! Mutation-to-invalidation planning.
//!
//! Maps what changed on the server to the cache key substrings that may now
//! hold stale pages and the feeds that should be refetched right away.

use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

use crate::feed::FeedKind;

use super::keys::CacheFamily;

/// A server-side change the client has just made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Purges every nearby page: `events_` is a substring of all of them,
    /// so a city-scoped purge would be subsumed anyway.
    EventCreated,
    EventUpdated { event_id: Uuid },
    EventArchived { event_id: Uuid },
    RsvpChanged { event_id: Uuid },
    ModeratorsChanged { event_id: Uuid },
    FriendRequestSent,
    FriendRequestAccepted,
    FriendRequestRejected,
    FriendRemoved,
    ProfileUpdated { user_id: Uuid },
    UserRoleChanged { user_id: Uuid },
}

/// Key substrings to purge and feeds to reload, deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    patterns: BTreeSet<String>,
    reload: BTreeSet<FeedKind>,
}

impl InvalidationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_mutation(mutation: &Mutation) -> Self {
        use CacheFamily as C;
        use FeedKind as K;

        match mutation {
            Mutation::EventCreated => Self::new()
                .purge_families([C::Events, C::NearbyEvents, C::AdminEvents])
                .reload_feeds([K::Events, K::Created, K::AdminEvents]),
            Mutation::EventUpdated { .. } | Mutation::EventArchived { .. } => Self::new()
                .purge_families([C::Events, C::UserEvents, C::NearbyEvents, C::AdminEvents])
                .reload_feeds([K::Events, K::Created, K::Organized, K::AdminEvents]),
            Mutation::RsvpChanged { .. } => Self::new()
                .purge_families([C::Events, C::UserEvents])
                .reload_feeds([K::Rsvped]),
            Mutation::ModeratorsChanged { .. } => Self::new()
                .purge_families([C::UserEvents])
                .reload_feeds([K::Moderated]),
            Mutation::FriendRequestSent => {
                Self::new().purge_families([C::FriendRequests, C::UserSearch])
            }
            Mutation::FriendRequestAccepted => Self::new().purge_families([
                C::Friends,
                C::FriendRequests,
                C::UserSearch,
                C::UserProfile,
            ]),
            Mutation::FriendRequestRejected => Self::new().purge_families([C::FriendRequests]),
            Mutation::FriendRemoved => {
                Self::new().purge_families([C::Friends, C::UserSearch, C::UserProfile])
            }
            Mutation::ProfileUpdated { .. } => Self::new()
                .purge_families([C::UserProfile, C::UserSearch, C::AdminUsers])
                .reload_feeds([K::AdminUsers]),
            Mutation::UserRoleChanged { .. } => Self::new()
                .purge_families([C::AdminUsers, C::UserProfile])
                .reload_feeds([K::AdminUsers]),
        }
    }

    pub fn from_mutations<'a>(mutations: impl IntoIterator<Item = &'a Mutation>) -> Self {
        mutations
            .into_iter()
            .map(Self::for_mutation)
            .fold(Self::new(), Self::merge)
    }

    pub fn purge(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.insert(pattern.into());
        self
    }

    pub fn purge_families(mut self, families: impl IntoIterator<Item = CacheFamily>) -> Self {
        self.patterns
            .extend(families.into_iter().map(|family| family.prefix().to_string()));
        self
    }

    pub fn reload_feeds(mut self, feeds: impl IntoIterator<Item = FeedKind>) -> Self {
        self.reload.extend(feeds);
        self
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.patterns.extend(other.patterns);
        self.reload.extend(other.reload);
        self
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    pub fn feeds_to_reload(&self) -> impl Iterator<Item = FeedKind> + '_ {
        self.reload.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.reload.is_empty()
    }
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<&str> = self.patterns().collect();
        let feeds: Vec<&str> = self.reload.iter().map(FeedKind::as_str).collect();
        write!(
            f,
            "purge [{}] reload [{}]",
            patterns.join(", "),
            feeds.join(", ")
        )
    }
}
