use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eventfeed::cache::{
    CacheConfig, CacheFamily, CacheInvalidator, CacheKey, CacheRegistry, CacheStats, Mutation,
};
use eventfeed::error::FetchError;
use eventfeed::feed::{
    CachedFetcher, FeedHub, FeedKind, FeedOutcome, FeedSources, FnFetcher, PageFetcher,
};
use eventfeed_api_types::{
    Direction, EventFilters, EventSummary, Location, Page, PageParams, UserFilters, UserSummary,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct Blob {
    x: u32,
}

fn counting<F: Send + 'static>(
    calls: &Arc<AtomicUsize>,
    title: &'static str,
) -> Arc<dyn PageFetcher<EventSummary, F>> {
    let calls = Arc::clone(calls);
    Arc::new(FnFetcher::new(move |_params: PageParams<F>| {
        let call = calls.fetch_add(1, Ordering::SeqCst) as u128;
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, FetchError>(Page::single(
                vec![EventSummary::new(Uuid::from_u128(call + 1), title)],
                12,
            ))
        }
    }))
}

fn sources(public_calls: &Arc<AtomicUsize>) -> FeedSources {
    let unused = Arc::new(AtomicUsize::new(0));
    let users: Arc<dyn PageFetcher<UserSummary, UserFilters>> =
        Arc::new(FnFetcher::new(|_params: PageParams<UserFilters>| async move {
            Ok::<_, FetchError>(Page::<UserSummary>::empty())
        }));

    FeedSources {
        events: counting::<EventFilters>(public_calls, "public"),
        created: counting::<()>(&unused, "created"),
        rsvped: counting::<()>(&unused, "rsvped"),
        organized: counting::<()>(&unused, "organized"),
        moderated: counting::<()>(&unused, "moderated"),
        nearby: counting::<Location>(&unused, "nearby"),
        admin_users: users,
        admin_events: counting::<EventFilters>(&unused, "admin"),
    }
}

fn key<F>(family: CacheFamily, filters: &F) -> String
where
    F: serde::Serialize + eventfeed::cache::CacheScope,
{
    CacheKey::build(family, filters, None, Direction::Next, 12)
        .expect("serializable filters")
        .into_string()
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_their_ttl() {
    let registry = CacheRegistry::new(CacheConfig::default());

    registry.set("k", Blob { x: 1 }, Duration::from_millis(1000));
    tokio::time::advance(Duration::from_millis(999)).await;
    assert_eq!(registry.get::<Blob>("k"), Some(Blob { x: 1 }));

    tokio::time::advance(Duration::from_millis(501)).await;
    assert_eq!(
        registry.stats(),
        CacheStats {
            total_entries: 1,
            expired_entries: 1,
            in_flight: 0
        }
    );
    assert_eq!(registry.get::<Blob>("k"), None);
    assert_eq!(registry.stats().total_entries, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_cached_reads_share_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
    let fetcher = CachedFetcher::new(
        counting::<EventFilters>(&calls, "shared"),
        Arc::clone(&registry),
        CacheFamily::Events,
    );

    let params = PageParams::first_page(EventFilters::default()).with_page_size(12);
    let (first, second) = tokio::join!(fetcher.fetch(params.clone()), fetcher.fetch(params));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.expect("first"), second.expect("second"));
    assert_eq!(registry.stats().in_flight, 0);
    assert_eq!(registry.stats().total_entries, 1);
}

#[tokio::test]
async fn failed_fetches_are_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let flaky: Arc<dyn PageFetcher<EventSummary, EventFilters>> =
        Arc::new(FnFetcher::new(move |_params: PageParams<EventFilters>| {
            let call = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Err(FetchError::Status {
                        status: 503,
                        message: "busy".to_string(),
                    })
                } else {
                    Ok(Page::single(
                        vec![EventSummary::new(Uuid::from_u128(9), "recovered")],
                        12,
                    ))
                }
            }
        }));
    let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
    let fetcher = CachedFetcher::new(flaky, Arc::clone(&registry), CacheFamily::Events);
    let params = PageParams::first_page(EventFilters::default());

    assert!(fetcher.fetch(params.clone()).await.is_err());
    assert_eq!(registry.stats().total_entries, 0);

    let page = fetcher.fetch(params.clone()).await.expect("second attempt");
    assert_eq!(page.items[0].title, "recovered");
    fetcher.fetch(params).await.expect("cached");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn invalidation_removes_only_matching_keys() {
    let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
    let ttl = Duration::from_secs(60);
    registry.set(&key(CacheFamily::Events, &EventFilters::default()), Blob { x: 1 }, ttl);
    registry.set(
        &key(CacheFamily::NearbyEvents, &Location::new("Austin", "TX")),
        Blob { x: 2 },
        ttl,
    );
    registry.set(&key(CacheFamily::Friends, &()), Blob { x: 3 }, ttl);
    registry.set(&key(CacheFamily::UserSearch, &()), Blob { x: 4 }, ttl);
    let invalidator = CacheInvalidator::new(Arc::clone(&registry));

    assert_eq!(invalidator.nearby_events(Some("Denver"), Some("CO")), 0);
    assert_eq!(invalidator.friends(), 1);
    // "events_" is a substring of every nearby key as well.
    assert_eq!(invalidator.events(), 2);
    assert_eq!(invalidator.events(), 0);

    assert_eq!(
        registry.keys(),
        vec![key(CacheFamily::UserSearch, &())]
    );
}

#[tokio::test]
async fn mutation_purges_and_reloads_affected_feeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
    let hub = Arc::new(FeedHub::with_cache(sources(&calls), &registry, 12));
    let invalidator = CacheInvalidator::new(Arc::clone(&registry)).with_reloader(hub.clone());

    hub.events()
        .fetch_initial(PageParams::first_page(EventFilters::default()))
        .await;
    hub.events()
        .fetch_initial(PageParams::first_page(EventFilters::default()))
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let report = invalidator
        .apply(&Mutation::EventCreated)
        .await;

    assert_eq!(report.removed, 1);
    assert!(
        report
            .reloaded
            .contains(&(FeedKind::Events, FeedOutcome::Applied))
    );
    assert!(
        report
            .reloaded
            .contains(&(FeedKind::Created, FeedOutcome::Skipped))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(hub.events().snapshot().items[0].id, Uuid::from_u128(2));
}

#[tokio::test]
async fn refresh_on_a_cached_feed_asks_the_server_again() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
    let hub = FeedHub::with_cache(sources(&calls), &registry, 12);
    let params = || PageParams::first_page(EventFilters::default());

    hub.events().fetch_initial(params()).await;
    assert_eq!(hub.events().snapshot().items[0].id, Uuid::from_u128(1));

    assert_eq!(hub.events().refresh(params()).await, FeedOutcome::Applied);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(hub.events().snapshot().items[0].id, Uuid::from_u128(2));

    // The refreshed page replaced the stored one.
    hub.events().fetch_initial(params()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(hub.events().snapshot().items[0].id, Uuid::from_u128(2));
    assert_eq!(registry.stats().total_entries, 1);
}

#[tokio::test]
async fn disabled_cache_always_fetches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(CacheRegistry::new(CacheConfig::disabled()));
    let hub = FeedHub::with_cache(sources(&calls), &registry, 12);

    for _ in 0..3 {
        hub.events()
            .fetch_initial(PageParams::first_page(EventFilters::default()))
            .await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(registry.keys().is_empty());
}
