//! Cache key definitions.
//!
//! Keys are plain strings so that invalidation can match on substrings.
//! Layout: `{family prefix}[{scope}_]{page}_{page size}_{filters}` where the
//! cursor and the filter JSON are base64 encoded with an alphabet that never
//! produces `_`, keeping the segments unambiguous.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use eventfeed_api_types::{Direction, EventFilters, Location, UserFilters};
use serde::Serialize;

/// Groups of cache entries that share a TTL and an invalidation prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheFamily {
    Events,
    UserEvents,
    NearbyEvents,
    AdminUsers,
    AdminEvents,
    Friends,
    FriendRequests,
    UserSearch,
    UserProfile,
}

impl CacheFamily {
    pub const ALL: [CacheFamily; 9] = [
        CacheFamily::Events,
        CacheFamily::UserEvents,
        CacheFamily::NearbyEvents,
        CacheFamily::AdminUsers,
        CacheFamily::AdminEvents,
        CacheFamily::Friends,
        CacheFamily::FriendRequests,
        CacheFamily::UserSearch,
        CacheFamily::UserProfile,
    ];

    /// Key prefix; also the substring used to purge the whole family.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheFamily::Events => "events_",
            CacheFamily::UserEvents => "user_events_",
            CacheFamily::NearbyEvents => "nearby_events_",
            CacheFamily::AdminUsers => "admin_users_",
            CacheFamily::AdminEvents => "admin_events_",
            CacheFamily::Friends => "friends_",
            CacheFamily::FriendRequests => "friend_requests_",
            CacheFamily::UserSearch => "user_search_",
            CacheFamily::UserProfile => "user_profile_",
        }
    }

    /// Substring matching the family narrowed to a location.
    ///
    /// Only city-then-state can be expressed as a substring; a state
    /// without a city falls back to the whole family.
    pub fn scoped_pattern(&self, city: Option<&str>, state: Option<&str>) -> String {
        match (city, state) {
            (Some(city), Some(state)) => format!(
                "{}{}_{}_",
                self.prefix(),
                normalize_segment(city),
                normalize_segment(state)
            ),
            (Some(city), None) => format!("{}{}_", self.prefix(), normalize_segment(city)),
            _ => self.prefix().to_string(),
        }
    }
}

impl fmt::Display for CacheFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches('_'))
    }
}

/// Filter types that narrow their cache keys to a plain-text scope.
pub trait CacheScope {
    fn cache_scope(&self) -> Option<String> {
        None
    }
}

impl CacheScope for () {}
impl CacheScope for EventFilters {}
impl CacheScope for UserFilters {}

impl CacheScope for Location {
    fn cache_scope(&self) -> Option<String> {
        Some(format!(
            "{}_{}",
            normalize_segment(&self.city),
            normalize_segment(&self.state)
        ))
    }
}

/// A fully rendered cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for one page request.
    ///
    /// Filters serialize in declared field order with absent fields
    /// skipped, so equal filters always render the same key.
    pub fn build<F>(
        family: CacheFamily,
        filters: &F,
        cursor: Option<&str>,
        direction: Direction,
        page_size: u32,
    ) -> Result<Self, serde_json::Error>
    where
        F: Serialize + CacheScope,
    {
        let encoded_filters = STANDARD_NO_PAD.encode(serde_json::to_vec(filters)?);
        let page = match (cursor, direction) {
            (None, _) => "first".to_string(),
            (Some(cursor), Direction::Next) => format!("n{}", STANDARD_NO_PAD.encode(cursor)),
            (Some(cursor), Direction::Prev) => format!("p{}", STANDARD_NO_PAD.encode(cursor)),
        };

        let mut key = String::from(family.prefix());
        if let Some(scope) = filters.cache_scope() {
            key.push_str(&scope);
            key.push('_');
        }
        key.push_str(&page);
        key.push('_');
        key.push_str(&page_size.to_string());
        key.push('_');
        key.push_str(&encoded_filters);
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn normalize_segment(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || ch == '_' {
                '-'
            } else {
                ch.to_ascii_lowercase()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn austin() -> EventFilters {
        EventFilters {
            city: Some("Austin".to_string()),
            category: Some("tech".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn identical_filters_produce_identical_keys() {
        let first = CacheKey::build(CacheFamily::Events, &austin(), None, Direction::Next, 12)
            .expect("key");
        let second = CacheKey::build(CacheFamily::Events, &austin(), None, Direction::Next, 12)
            .expect("key");
        assert_eq!(first, second);
        assert!(first.as_str().starts_with("events_first_12_"));
    }

    #[test]
    fn pages_sizes_and_filters_do_not_collide() {
        let base =
            CacheKey::build(CacheFamily::Events, &austin(), None, Direction::Next, 12).expect("key");
        let other_size =
            CacheKey::build(CacheFamily::Events, &austin(), None, Direction::Next, 6).expect("key");
        let other_page = CacheKey::build(
            CacheFamily::Events,
            &austin(),
            Some("c1"),
            Direction::Next,
            12,
        )
        .expect("key");
        let prev_page = CacheKey::build(
            CacheFamily::Events,
            &austin(),
            Some("c1"),
            Direction::Prev,
            12,
        )
        .expect("key");
        let other_filters = CacheKey::build(
            CacheFamily::Events,
            &EventFilters::default(),
            None,
            Direction::Next,
            12,
        )
        .expect("key");

        let keys = [&base, &other_size, &other_page, &prev_page, &other_filters];
        for (i, left) in keys.iter().enumerate() {
            for right in keys.iter().skip(i + 1) {
                assert_ne!(left, right);
            }
        }
    }

    #[test]
    fn cursors_containing_separators_stay_unambiguous() {
        let a = CacheKey::build(
            CacheFamily::AdminUsers,
            &UserFilters::default(),
            Some("a_1"),
            Direction::Next,
            2,
        )
        .expect("key");
        let b = CacheKey::build(
            CacheFamily::AdminUsers,
            &UserFilters::default(),
            Some("a"),
            Direction::Next,
            12,
        )
        .expect("key");
        assert_ne!(a, b);
        assert_eq!(a.as_str().matches('_').count(), b.as_str().matches('_').count());
    }

    #[test]
    fn location_scope_is_readable_and_matches_scoped_pattern() {
        let key = CacheKey::build(
            CacheFamily::NearbyEvents,
            &Location::new("San Antonio", "TX"),
            None,
            Direction::Next,
            12,
        )
        .expect("key");

        assert!(key.as_str().starts_with("nearby_events_san-antonio_tx_first_12_"));

        let city_and_state =
            CacheFamily::NearbyEvents.scoped_pattern(Some("San Antonio"), Some("TX"));
        let city_only = CacheFamily::NearbyEvents.scoped_pattern(Some("san antonio"), None);
        let other_city = CacheFamily::NearbyEvents.scoped_pattern(Some("Austin"), Some("TX"));

        assert!(key.as_str().contains(&city_and_state));
        assert!(key.as_str().contains(&city_only));
        assert!(!key.as_str().contains(&other_city));
        assert_eq!(
            CacheFamily::NearbyEvents.scoped_pattern(None, Some("TX")),
            "nearby_events_"
        );
    }

    #[test]
    fn family_prefixes_are_distinct() {
        for (i, left) in CacheFamily::ALL.iter().enumerate() {
            for right in CacheFamily::ALL.iter().skip(i + 1) {
                assert_ne!(left.prefix(), right.prefix());
            }
        }
        assert!(!"friend_requests_first".contains(CacheFamily::Friends.prefix()));
        assert_eq!(CacheFamily::UserProfile.to_string(), "user_profile");
    }
}
