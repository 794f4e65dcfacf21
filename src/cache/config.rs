//! Cache configuration.
//!
//! Controls the response cache and its per-family TTLs via `eventfeed.toml`.

use std::time::Duration;

use super::keys::CacheFamily;

const MINUTE: u64 = 60;

// Default values for cache configuration
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_TTL_EVENTS_SECS: u64 = 5 * MINUTE;
const DEFAULT_TTL_USER_EVENTS_SECS: u64 = 10 * MINUTE;
const DEFAULT_TTL_NEARBY_EVENTS_SECS: u64 = 3 * MINUTE;
const DEFAULT_TTL_ADMIN_DATA_SECS: u64 = 5 * MINUTE;
const DEFAULT_TTL_FRIENDS_SECS: u64 = 10 * MINUTE;
const DEFAULT_TTL_FRIEND_REQUESTS_SECS: u64 = 5 * MINUTE;
const DEFAULT_TTL_USER_SEARCH_SECS: u64 = 2 * MINUTE;
const DEFAULT_TTL_USER_PROFILES_SECS: u64 = 15 * MINUTE;

/// Default time-to-live per cache family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlTable {
    pub events: Duration,
    pub user_events: Duration,
    pub nearby_events: Duration,
    pub admin_data: Duration,
    pub friends: Duration,
    pub friend_requests: Duration,
    pub user_search: Duration,
    pub user_profiles: Duration,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            events: Duration::from_secs(DEFAULT_TTL_EVENTS_SECS),
            user_events: Duration::from_secs(DEFAULT_TTL_USER_EVENTS_SECS),
            nearby_events: Duration::from_secs(DEFAULT_TTL_NEARBY_EVENTS_SECS),
            admin_data: Duration::from_secs(DEFAULT_TTL_ADMIN_DATA_SECS),
            friends: Duration::from_secs(DEFAULT_TTL_FRIENDS_SECS),
            friend_requests: Duration::from_secs(DEFAULT_TTL_FRIEND_REQUESTS_SECS),
            user_search: Duration::from_secs(DEFAULT_TTL_USER_SEARCH_SECS),
            user_profiles: Duration::from_secs(DEFAULT_TTL_USER_PROFILES_SECS),
        }
    }
}

impl TtlTable {
    pub fn for_family(&self, family: CacheFamily) -> Duration {
        match family {
            CacheFamily::Events => self.events,
            CacheFamily::UserEvents => self.user_events,
            CacheFamily::NearbyEvents => self.nearby_events,
            CacheFamily::AdminUsers | CacheFamily::AdminEvents => self.admin_data,
            CacheFamily::Friends => self.friends,
            CacheFamily::FriendRequests => self.friend_requests,
            CacheFamily::UserSearch => self.user_search,
            CacheFamily::UserProfile => self.user_profiles,
        }
    }
}

/// Cache configuration resolved from settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Serve reads from the cache; when off every read goes to the fetcher.
    pub enabled: bool,
    /// Period of the background sweep that drops expired entries.
    pub cleanup_interval: Duration,
    pub ttl: TtlTable,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            ttl: TtlTable::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            cleanup_interval: settings.cleanup_interval,
            ttl: settings.ttl.clone(),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn ttl_for(&self, family: CacheFamily) -> Duration {
        self.ttl.for_family(family)
    }
}
