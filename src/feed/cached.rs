use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventfeed_api_types::{Page, PageParams};
use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheFamily, CacheKey, CacheRegistry, CacheScope};
use crate::error::FetchError;

use super::fetcher::PageFetcher;
use super::state::DEFAULT_PAGE_SIZE;

/// Reads pages through the cache registry before asking `inner`.
///
/// Concurrent requests for the same page share one upstream fetch, and
/// failed fetches are never cached.
pub struct CachedFetcher<T, F> {
    inner: Arc<dyn PageFetcher<T, F>>,
    registry: Arc<CacheRegistry>,
    family: CacheFamily,
    ttl: Duration,
}

impl<T, F> CachedFetcher<T, F> {
    /// Uses the registry's configured TTL for `family`.
    pub fn new(
        inner: Arc<dyn PageFetcher<T, F>>,
        registry: Arc<CacheRegistry>,
        family: CacheFamily,
    ) -> Self {
        let ttl = registry.config().ttl_for(family);
        Self {
            inner,
            registry,
            family,
            ttl,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn family(&self) -> CacheFamily {
        self.family
    }

    fn key(&self, params: &PageParams<F>) -> Result<CacheKey, FetchError>
    where
        F: Serialize + CacheScope,
    {
        CacheKey::build(
            self.family,
            &params.filters,
            params.cursor.as_deref(),
            params.direction,
            params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .map_err(|err| FetchError::other(format!("failed to build cache key: {err}")))
    }
}

#[async_trait]
impl<T, F> PageFetcher<T, F> for CachedFetcher<T, F>
where
    T: Clone + Send + Sync + 'static,
    F: Serialize + CacheScope + Send + Sync + 'static,
{
    async fn fetch(&self, params: PageParams<F>) -> Result<Page<T>, FetchError> {
        let key = self.key(&params)?;
        debug!(family = %self.family, key = %key, "Reading page through cache");

        let inner = Arc::clone(&self.inner);
        self.registry
            .get_cached_data(key.as_str(), self.ttl, move || async move {
                inner.fetch(params).await
            })
            .await
    }

    async fn refetch(&self, params: PageParams<F>) -> Result<Page<T>, FetchError> {
        let key = self.key(&params)?;
        debug!(family = %self.family, key = %key, "Refetching page past cache");

        let inner = Arc::clone(&self.inner);
        self.registry
            .refresh_cached_data(key.as_str(), self.ttl, move || async move {
                inner.refetch(params).await
            })
            .await
    }
}
