use std::sync::Arc;

use async_trait::async_trait;
use eventfeed_api_types::{EventFilters, EventSummary, Location, UserFilters, UserSummary};
use tracing::info;

use crate::cache::{CacheFamily, CacheRegistry, FeedReloader};

use super::cached::CachedFetcher;
use super::fetcher::PageFetcher;
use super::machine::Feed;
use super::state::FeedOutcome;
use super::tracked::TrackedFeed;
use super::FeedKind;

pub type EventFetcher<F> = Arc<dyn PageFetcher<EventSummary, F>>;

/// One page fetcher per feed.
#[derive(Clone)]
pub struct FeedSources {
    pub events: EventFetcher<EventFilters>,
    pub created: EventFetcher<()>,
    pub rsvped: EventFetcher<()>,
    pub organized: EventFetcher<()>,
    pub moderated: EventFetcher<()>,
    pub nearby: EventFetcher<Location>,
    pub admin_users: Arc<dyn PageFetcher<UserSummary, UserFilters>>,
    pub admin_events: EventFetcher<EventFilters>,
}

impl FeedSources {
    /// Front the public, nearby and admin fetchers with the cache registry.
    pub fn cached(self, registry: &Arc<CacheRegistry>) -> Self {
        Self {
            events: Arc::new(CachedFetcher::new(
                self.events,
                Arc::clone(registry),
                CacheFamily::Events,
            )),
            nearby: Arc::new(CachedFetcher::new(
                self.nearby,
                Arc::clone(registry),
                CacheFamily::NearbyEvents,
            )),
            admin_users: Arc::new(CachedFetcher::new(
                self.admin_users,
                Arc::clone(registry),
                CacheFamily::AdminUsers,
            )),
            admin_events: Arc::new(CachedFetcher::new(
                self.admin_events,
                Arc::clone(registry),
                CacheFamily::AdminEvents,
            )),
            ..self
        }
    }
}

/// Every feed of the client, each independent of the others.
pub struct FeedHub {
    events: Feed<EventSummary, EventFilters>,
    created: Feed<EventSummary, ()>,
    rsvped: Feed<EventSummary, ()>,
    organized: Feed<EventSummary, ()>,
    moderated: Feed<EventSummary, ()>,
    nearby: TrackedFeed<EventSummary, Location>,
    admin_users: TrackedFeed<UserSummary, UserFilters>,
    admin_events: TrackedFeed<EventSummary, EventFilters>,
}

impl FeedHub {
    pub fn new(sources: FeedSources, default_page_size: u32) -> Self {
        Self {
            events: Feed::new(FeedKind::Events, sources.events)
                .with_default_page_size(default_page_size),
            created: Feed::new(FeedKind::Created, sources.created)
                .with_default_page_size(default_page_size),
            rsvped: Feed::new(FeedKind::Rsvped, sources.rsvped)
                .with_default_page_size(default_page_size),
            organized: Feed::new(FeedKind::Organized, sources.organized)
                .with_default_page_size(default_page_size),
            moderated: Feed::new(FeedKind::Moderated, sources.moderated)
                .with_default_page_size(default_page_size),
            nearby: TrackedFeed::new(
                Feed::new(FeedKind::Nearby, sources.nearby)
                    .with_default_page_size(default_page_size),
            ),
            admin_users: TrackedFeed::new(
                Feed::new(FeedKind::AdminUsers, sources.admin_users)
                    .with_default_page_size(default_page_size),
            ),
            admin_events: TrackedFeed::new(
                Feed::new(FeedKind::AdminEvents, sources.admin_events)
                    .with_default_page_size(default_page_size),
            ),
        }
    }

    /// Like [`FeedHub::new`], with cacheable feeds read through `registry`.
    pub fn with_cache(
        sources: FeedSources,
        registry: &Arc<CacheRegistry>,
        default_page_size: u32,
    ) -> Self {
        Self::new(sources.cached(registry), default_page_size)
    }

    pub fn events(&self) -> &Feed<EventSummary, EventFilters> {
        &self.events
    }

    pub fn created(&self) -> &Feed<EventSummary, ()> {
        &self.created
    }

    pub fn rsvped(&self) -> &Feed<EventSummary, ()> {
        &self.rsvped
    }

    pub fn organized(&self) -> &Feed<EventSummary, ()> {
        &self.organized
    }

    pub fn moderated(&self) -> &Feed<EventSummary, ()> {
        &self.moderated
    }

    pub fn nearby(&self) -> &TrackedFeed<EventSummary, Location> {
        &self.nearby
    }

    pub fn admin_users(&self) -> &TrackedFeed<UserSummary, UserFilters> {
        &self.admin_users
    }

    pub fn admin_events(&self) -> &TrackedFeed<EventSummary, EventFilters> {
        &self.admin_events
    }

    /// Reset one feed and refetch its first page under its last parameters.
    pub async fn reload(&self, kind: FeedKind) -> FeedOutcome {
        let outcome = match kind {
            FeedKind::Events => self.events.reload().await,
            FeedKind::Created => self.created.reload().await,
            FeedKind::Rsvped => self.rsvped.reload().await,
            FeedKind::Organized => self.organized.reload().await,
            FeedKind::Moderated => self.moderated.reload().await,
            FeedKind::Nearby => self.nearby.reload().await,
            FeedKind::AdminUsers => self.admin_users.reload().await,
            FeedKind::AdminEvents => self.admin_events.reload().await,
        };
        info!(feed = %kind, ?outcome, "Feed reloaded");
        outcome
    }

    pub fn reset(&self, kind: FeedKind) {
        match kind {
            FeedKind::Events => self.events.reset(),
            FeedKind::Created => self.created.reset(),
            FeedKind::Rsvped => self.rsvped.reset(),
            FeedKind::Organized => self.organized.reset(),
            FeedKind::Moderated => self.moderated.reset(),
            FeedKind::Nearby => self.nearby.reset(),
            FeedKind::AdminUsers => self.admin_users.reset(),
            FeedKind::AdminEvents => self.admin_events.reset(),
        }
    }

    pub fn reset_all(&self) {
        for kind in FeedKind::ALL {
            self.reset(kind);
        }
    }
}

#[async_trait]
impl FeedReloader for FeedHub {
    async fn reload(&self, kind: FeedKind) -> FeedOutcome {
        FeedHub::reload(self, kind).await
    }
}

#[cfg(test)]
mod tests {
    use eventfeed_api_types::{Page, PageParams};
    use uuid::Uuid;

    use super::*;
    use crate::cache::CacheConfig;
    use crate::error::FetchError;
    use crate::feed::FnFetcher;

    fn titled<F: Send + 'static>(title: &'static str) -> EventFetcher<F> {
        Arc::new(FnFetcher::new(move |_params: PageParams<F>| async move {
            Ok::<_, FetchError>(Page::single(
                vec![EventSummary::new(Uuid::new_v4(), title)],
                12,
            ))
        }))
    }

    fn sources() -> FeedSources {
        FeedSources {
            events: titled("public"),
            created: titled("created"),
            rsvped: titled("rsvped"),
            organized: titled("organized"),
            moderated: titled("moderated"),
            nearby: titled("nearby"),
            admin_users: Arc::new(FnFetcher::new(|_params: PageParams<UserFilters>| async {
                Ok::<_, FetchError>(Page::single(
                    vec![UserSummary::new(Uuid::new_v4(), "a@example.com")],
                    12,
                ))
            })),
            admin_events: titled("admin"),
        }
    }

    #[tokio::test]
    async fn feeds_load_from_their_own_sources() {
        let hub = FeedHub::new(sources(), 12);

        hub.created().fetch_initial(PageParams::default()).await;
        hub.rsvped().fetch_initial(PageParams::default()).await;

        assert_eq!(hub.created().snapshot().items[0].title, "created");
        assert_eq!(hub.rsvped().snapshot().items[0].title, "rsvped");
        assert!(!hub.organized().snapshot().has_fetched);
    }

    #[tokio::test]
    async fn reload_replaces_items_of_one_feed() {
        let hub = FeedHub::new(sources(), 12);
        hub.created().fetch_initial(PageParams::default()).await;
        hub.rsvped().fetch_initial(PageParams::default()).await;
        let created_before = hub.created().snapshot().items[0].id;
        let rsvped_before = hub.rsvped().snapshot().items[0].id;

        assert_eq!(hub.reload(FeedKind::Created).await, FeedOutcome::Applied);
        assert_eq!(hub.reload(FeedKind::Organized).await, FeedOutcome::Skipped);

        assert_ne!(hub.created().snapshot().items[0].id, created_before);
        assert_eq!(hub.rsvped().snapshot().items[0].id, rsvped_before);
    }

    #[tokio::test]
    async fn cached_hub_reads_admin_pages_through_registry() {
        let registry = Arc::new(CacheRegistry::new(CacheConfig::default()));
        let hub = FeedHub::with_cache(sources(), &registry, 12);

        hub.admin_users().load(UserFilters::default()).await;
        hub.admin_events().load(EventFilters::default()).await;
        hub.created().fetch_initial(PageParams::default()).await;

        let keys = registry.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].starts_with("admin_events_first_12_"));
        assert!(keys[1].starts_with("admin_users_first_12_"));
    }

    #[tokio::test]
    async fn reset_all_restores_every_feed() {
        let hub = FeedHub::new(sources(), 12);
        hub.events().fetch_initial(PageParams::default()).await;
        hub.nearby().load(Location::new("austin", "TX")).await;

        hub.reset_all();

        assert!(hub.events().snapshot().is_empty());
        assert!(hub.nearby().feed().snapshot().is_empty());
        assert_eq!(hub.nearby().context(), None);
    }
}
