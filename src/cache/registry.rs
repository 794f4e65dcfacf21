//! Response cache registry.
//!
//! Holds short-lived pages keyed by request shape, purges them by key
//! substring, and coalesces concurrent misses on the same key into a single
//! fetch.

use std::any::type_name;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use metrics::counter;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::FetchError;

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::store::{CacheStats, CachedValue, EntryStore, Lookup};

const SOURCE: &str = "cache::registry";

const METRIC_CACHE_HIT: &str = "eventfeed_cache_hit_total";
const METRIC_CACHE_MISS: &str = "eventfeed_cache_miss_total";
const METRIC_CACHE_EXPIRED: &str = "eventfeed_cache_expired_total";
const METRIC_CACHE_INVALIDATED: &str = "eventfeed_cache_invalidated_total";
const METRIC_CACHE_COALESCED: &str = "eventfeed_cache_coalesced_total";

type FlightResult = Result<CachedValue, FetchError>;
type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;

struct InFlight {
    generation: u64,
    future: SharedFlight,
}

/// Keyed TTL cache shared by every feed.
///
/// Construct one per process (or per test) and share it behind an `Arc`.
/// The periodic sweep only runs between [`CacheRegistry::start`] and
/// [`CacheRegistry::stop`]; expired entries are dropped lazily on read
/// either way.
pub struct CacheRegistry {
    config: CacheConfig,
    store: EntryStore,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_generation: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheRegistry {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            store: EntryStore::new(),
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Insert or overwrite `key`, expiring `ttl` from now.
    pub fn set<T>(&self, key: &str, data: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        if !self.config.enabled {
            return;
        }
        self.store.insert(key, Arc::new(data), ttl);
    }

    /// Read `key`. Expired entries are removed and reported as absent.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.store.lookup(key) {
            Lookup::Hit(data) => match data.downcast_ref::<T>() {
                Some(value) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    Some(value.clone())
                }
                None => {
                    warn!(
                        key,
                        expected = type_name::<T>(),
                        "Cached value has a different type; treating as miss"
                    );
                    counter!(METRIC_CACHE_MISS).increment(1);
                    None
                }
            },
            Lookup::Expired(age) => {
                debug!(
                    key,
                    age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
                    "Cache entry expired"
                );
                counter!(METRIC_CACHE_EXPIRED).increment(1);
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
            Lookup::Miss => {
                counter!(METRIC_CACHE_MISS).increment(1);
                None
            }
        }
    }

    /// Delete every entry whose key contains `pattern`.
    ///
    /// Fetches still in flight for matching keys are forgotten, so their
    /// results are returned to their callers but never stored.
    pub fn invalidate(&self, pattern: &str) -> usize {
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "invalidate");
        let flights_before = in_flight.len();
        in_flight.retain(|key, _| !key.contains(pattern));
        let dropped_flights = flights_before - in_flight.len();
        let removed = self.store.remove_matching(pattern);
        drop(in_flight);

        counter!(METRIC_CACHE_INVALIDATED).increment(removed as u64);
        debug!(pattern, removed, dropped_flights, "Cache entries invalidated");
        removed
    }

    pub fn invalidate_all(&self) -> usize {
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "invalidate_all");
        in_flight.clear();
        let removed = self.store.clear();
        drop(in_flight);

        counter!(METRIC_CACHE_INVALIDATED).increment(removed as u64);
        info!(removed, "Cache cleared");
        removed
    }

    /// Drop every expired entry now.
    pub fn sweep_expired(&self) -> usize {
        self.store.sweep_expired()
    }

    pub fn stats(&self) -> CacheStats {
        let (total_entries, expired_entries) = self.store.counts();
        let in_flight = mutex_lock(&self.in_flight, SOURCE, "stats").len();
        CacheStats {
            total_entries,
            expired_entries,
            in_flight,
        }
    }

    /// Sorted snapshot of the stored keys, for debug tooling.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    /// Read-through lookup.
    ///
    /// On a miss the fetch runs once per key no matter how many callers are
    /// waiting; all of them receive its result. Failures are returned to
    /// every waiter and nothing is cached.
    #[instrument(skip(self, fetch))]
    pub async fn get_cached_data<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if !self.config.enabled {
            return fetch().await;
        }

        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }
        self.fetch_through(key, ttl, fetch).await
    }

    /// Fetch `key` again whatever is stored, and store a successful result.
    ///
    /// The stored entry and any fetch already in flight for `key` are
    /// dropped first; callers that join afterwards share this fetch.
    #[instrument(skip(self, fetch))]
    pub async fn refresh_cached_data<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        if !self.config.enabled {
            return fetch().await;
        }

        let dropped_flight = mutex_lock(&self.in_flight, SOURCE, "refresh_cached_data")
            .remove(key)
            .is_some();
        let removed = self.store.remove(key);
        debug!(key, removed, dropped_flight, "Bypassing cached entry");

        self.fetch_through(key, ttl, fetch).await
    }

    async fn fetch_through<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, FetchError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        let (generation, flight) = match self.join_flight(key) {
            Some(joined) => {
                counter!(METRIC_CACHE_COALESCED).increment(1);
                debug!(key, "Joined in-flight fetch");
                joined
            }
            None => {
                let future = fetch()
                    .map_ok(|value| Arc::new(value) as CachedValue)
                    .boxed();
                self.register_flight(key, future)
            }
        };

        let outcome = flight.await;
        self.complete_flight(key, generation, ttl, &outcome);

        let data = outcome?;
        data.downcast_ref::<T>().cloned().ok_or_else(|| {
            FetchError::other(format!(
                "cached value for `{key}` is not a {}",
                type_name::<T>()
            ))
        })
    }

    /// Best-effort warm-up of `key`. Failures are logged and dropped.
    pub async fn prefetch<T, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> bool
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    {
        match self.get_cached_data(key, ttl, fetch).await {
            Ok(_) => true,
            Err(err) => {
                warn!(key, error = %err, "Prefetch failed; continuing without warm entry");
                false
            }
        }
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// Calling it again while the sweep is running is a no-op. Outside a
    /// runtime nothing is spawned and only lazy expiry applies.
    pub fn start(self: &Arc<Self>) {
        let mut sweeper = mutex_lock(&self.sweeper, SOURCE, "start");
        if sweeper.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            warn!("No tokio runtime available; cache sweep not started");
            return;
        };

        let registry = Arc::downgrade(self);
        let period = self.config.cleanup_interval;
        *sweeper = Some(runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let removed = registry.sweep_expired();
                if removed > 0 {
                    debug!(removed, "Swept expired cache entries");
                }
            }
        }));

        info!(
            interval_secs = period.as_secs(),
            "Cache sweep started"
        );
    }

    pub fn stop(&self) {
        if let Some(handle) = mutex_lock(&self.sweeper, SOURCE, "stop").take() {
            handle.abort();
            debug!("Cache sweep stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        mutex_lock(&self.sweeper, SOURCE, "is_running")
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn join_flight(&self, key: &str) -> Option<(u64, SharedFlight)> {
        mutex_lock(&self.in_flight, SOURCE, "join_flight")
            .get(key)
            .map(|flight| (flight.generation, flight.future.clone()))
    }

    fn register_flight(
        &self,
        key: &str,
        future: BoxFuture<'static, FlightResult>,
    ) -> (u64, SharedFlight) {
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "register_flight");
        // Another caller may have registered while this one built its future.
        if let Some(existing) = in_flight.get(key) {
            return (existing.generation, existing.future.clone());
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let shared = future.shared();
        in_flight.insert(
            key.to_string(),
            InFlight {
                generation,
                future: shared.clone(),
            },
        );
        (generation, shared)
    }

    /// First waiter to finish stores the result and retires the flight.
    fn complete_flight(&self, key: &str, generation: u64, ttl: Duration, outcome: &FlightResult) {
        let mut in_flight = mutex_lock(&self.in_flight, SOURCE, "complete_flight");
        let current = in_flight
            .get(key)
            .is_some_and(|flight| flight.generation == generation);
        if !current {
            return;
        }

        in_flight.remove(key);
        match outcome {
            Ok(data) => self.store.insert(key, Arc::clone(data), ttl),
            Err(err) => debug!(key, error = %err, "Fetch failed; nothing cached"),
        }
    }
}

impl Drop for CacheRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Payload {
        x: u32,
        tags: Vec<String>,
    }

    fn registry() -> Arc<CacheRegistry> {
        Arc::new(CacheRegistry::new(CacheConfig::default()))
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, FetchError>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn set_then_get_within_ttl_returns_value() {
        let registry = registry();
        let payload = Payload {
            x: 1,
            tags: vec!["rust".to_string()],
        };

        registry.set("k", payload.clone(), Duration::from_secs(1));
        tokio::time::advance(Duration::from_millis(500)).await;

        assert_eq!(registry.get::<Payload>("k"), Some(payload));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_absent_and_leaves_stats() {
        let registry = registry();
        registry.set("k", Payload { x: 1, tags: vec![] }, Duration::from_millis(1000));

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(
            registry.stats(),
            CacheStats {
                total_entries: 1,
                expired_entries: 1,
                in_flight: 0
            }
        );

        assert_eq!(registry.get::<Payload>("k"), None);
        assert_eq!(registry.stats(), CacheStats::default());
    }

    #[test]
    fn invalidate_removes_only_matching_keys() {
        let registry = registry();
        let ttl = Duration::from_secs(60);
        registry.set("events_first_12_e30", 1_u32, ttl);
        registry.set("nearby_events_austin_tx_first_12_e30", 2_u32, ttl);
        registry.set("friends_first_12_e30", 3_u32, ttl);
        registry.set("user_profile_first_12_e30", 4_u32, ttl);

        assert_eq!(registry.invalidate("events_"), 2);
        assert_eq!(
            registry.keys(),
            vec![
                "friends_first_12_e30".to_string(),
                "user_profile_first_12_e30".to_string()
            ]
        );

        assert_eq!(registry.invalidate_all(), 2);
        assert_eq!(registry.stats().total_entries, 0);
    }

    #[test]
    fn type_mismatch_reads_as_miss() {
        let registry = registry();
        registry.set("k", 5_u32, Duration::from_secs(60));
        assert_eq!(registry.get::<String>("k"), None);
        assert_eq!(registry.get::<u32>("k"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn read_through_caches_successful_fetch() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = registry
            .get_cached_data("k", Duration::from_secs(60), counting_fetch(&calls, 9))
            .await;
        let second = registry
            .get_cached_data("k", Duration::from_secs(60), counting_fetch(&calls, 10))
            .await;

        assert_eq!(first, Ok(9));
        assert_eq!(second, Ok(9));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_is_not_cached() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let failing_calls = Arc::clone(&calls);

        let failed = registry
            .get_cached_data("k", Duration::from_secs(60), move || async move {
                failing_calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(FetchError::transport("connection reset"))
            })
            .await;
        assert_eq!(failed, Err(FetchError::transport("connection reset")));
        assert_eq!(registry.stats(), CacheStats::default());

        let retried = registry
            .get_cached_data("k", Duration::from_secs(60), counting_fetch(&calls, 3))
            .await;
        assert_eq!(retried, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_fetch() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let (a, b, c) = tokio::join!(
            registry.get_cached_data("k", ttl, counting_fetch(&calls, 1)),
            registry.get_cached_data("k", ttl, counting_fetch(&calls, 2)),
            registry.get_cached_data("k", ttl, counting_fetch(&calls, 3)),
        );

        assert_eq!((a, b, c), (Ok(1), Ok(1), Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stats().in_flight, 0);
        assert_eq!(registry.get::<u32>("k"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_fetch_skips_caching_the_result() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));

        let (fetched, removed) = tokio::join!(
            registry.get_cached_data("events_k", Duration::from_secs(60), counting_fetch(&calls, 4)),
            async { registry.invalidate("events_") },
        );

        assert_eq!(fetched, Ok(4));
        assert_eq!(removed, 0);
        assert_eq!(registry.get::<u32>("events_k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_fetches_past_a_stored_entry() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        registry.set("k", 1_u32, Duration::from_secs(60));

        let refreshed = registry
            .refresh_cached_data("k", Duration::from_secs(60), counting_fetch(&calls, 5))
            .await;

        assert_eq!(refreshed, Ok(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get::<u32>("k"), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_supersedes_fetch_in_flight() {
        let registry = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        let ttl = Duration::from_secs(60);

        let (older, newer) = tokio::join!(
            registry.get_cached_data("k", ttl, counting_fetch(&calls, 1)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                registry
                    .refresh_cached_data("k", ttl, counting_fetch(&calls, 2))
                    .await
            },
        );

        assert_eq!((older, newer), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get::<u32>("k"), Some(2));
        assert_eq!(registry.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_cache_always_fetches() {
        let registry = CacheRegistry::new(CacheConfig::disabled());
        let calls = Arc::new(AtomicUsize::new(0));

        registry.set("k", 1_u32, Duration::from_secs(60));
        assert_eq!(registry.get::<u32>("k"), None);

        for _ in 0..2 {
            let value = registry
                .get_cached_data("k", Duration::from_secs(60), counting_fetch(&calls, 8))
                .await;
            assert_eq!(value, Ok(8));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_swallows_failures() {
        let registry = registry();

        let warmed = registry
            .prefetch("k", Duration::from_secs(60), || async {
                Err::<u32, _>(FetchError::other("boom"))
            })
            .await;
        assert!(!warmed);

        let warmed = registry
            .prefetch("k", Duration::from_secs(60), || async { Ok::<_, FetchError>(2_u32) })
            .await;
        assert!(warmed);
        assert_eq!(registry.get::<u32>("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweep_removes_expired_entries() {
        let registry = registry();
        registry.start();
        registry.start();
        assert!(registry.is_running());

        registry.set("short", 1_u32, Duration::from_secs(1));
        registry.set("long", 2_u32, Duration::from_secs(600));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(
            registry.stats(),
            CacheStats {
                total_entries: 1,
                expired_entries: 0,
                in_flight: 0
            }
        );

        registry.stop();
        assert!(!registry.is_running());
    }

    #[test]
    fn start_outside_runtime_is_a_no_op() {
        let registry = registry();
        registry.start();
        assert!(!registry.is_running());
    }
}
