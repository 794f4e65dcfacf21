//! Cache invalidation entry points.
//!
//! Called after the client mutates something on the server. Purges are
//! coarse (key substring per family); pages already being fetched under a
//! purged key are returned to their callers but not stored.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, instrument};

use crate::feed::{FeedKind, FeedOutcome};

use super::keys::CacheFamily;
use super::planner::{InvalidationPlan, Mutation};
use super::registry::CacheRegistry;

/// Something that can reset and refetch a feed on request.
#[async_trait]
pub trait FeedReloader: Send + Sync {
    async fn reload(&self, kind: FeedKind) -> FeedOutcome;
}

/// Result of applying an [`InvalidationPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub removed: usize,
    pub reloaded: Vec<(FeedKind, FeedOutcome)>,
}

#[derive(Clone)]
pub struct CacheInvalidator {
    registry: Arc<CacheRegistry>,
    reloader: Option<Arc<dyn FeedReloader>>,
}

impl CacheInvalidator {
    pub fn new(registry: Arc<CacheRegistry>) -> Self {
        Self {
            registry,
            reloader: None,
        }
    }

    /// Feeds named by a plan are reloaded through `reloader`.
    pub fn with_reloader(mut self, reloader: Arc<dyn FeedReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    pub fn events(&self) -> usize {
        self.purge_family(CacheFamily::Events)
    }

    pub fn user_events(&self) -> usize {
        self.purge_family(CacheFamily::UserEvents)
    }

    /// All nearby pages, or only those for the given city (and state).
    pub fn nearby_events(&self, city: Option<&str>, state: Option<&str>) -> usize {
        let pattern = CacheFamily::NearbyEvents.scoped_pattern(city, state);
        self.registry.invalidate(&pattern)
    }

    pub fn admin_users(&self) -> usize {
        self.purge_family(CacheFamily::AdminUsers)
    }

    pub fn admin_events(&self) -> usize {
        self.purge_family(CacheFamily::AdminEvents)
    }

    pub fn friends(&self) -> usize {
        self.purge_family(CacheFamily::Friends)
    }

    pub fn friend_requests(&self) -> usize {
        self.purge_family(CacheFamily::FriendRequests)
    }

    pub fn user_search(&self) -> usize {
        self.purge_family(CacheFamily::UserSearch)
    }

    pub fn user_profiles(&self) -> usize {
        self.purge_family(CacheFamily::UserProfile)
    }

    pub fn all(&self) -> usize {
        self.registry.invalidate_all()
    }

    /// Purge and reload everything `mutation` may have made stale.
    #[instrument(skip(self))]
    pub async fn apply(&self, mutation: &Mutation) -> InvalidationReport {
        self.apply_plan(&InvalidationPlan::for_mutation(mutation)).await
    }

    pub async fn apply_plan(&self, plan: &InvalidationPlan) -> InvalidationReport {
        let removed: usize = plan
            .patterns()
            .map(|pattern| self.registry.invalidate(pattern))
            .sum();

        let reloaded = match &self.reloader {
            Some(reloader) => {
                let feeds: Vec<FeedKind> = plan.feeds_to_reload().collect();
                let outcomes = join_all(feeds.iter().map(|kind| reloader.reload(*kind))).await;
                feeds.into_iter().zip(outcomes).collect()
            }
            None => {
                if plan.feeds_to_reload().next().is_some() {
                    debug!(%plan, "No feed reloader registered; skipping reloads");
                }
                Vec::new()
            }
        };

        info!(%plan, removed, reloaded = reloaded.len(), "Cache invalidation applied");
        InvalidationReport { removed, reloaded }
    }

    fn purge_family(&self, family: CacheFamily) -> usize {
        self.registry.invalidate(family.prefix())
    }
}
