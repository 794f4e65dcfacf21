use std::future::Future;

use async_trait::async_trait;
use eventfeed_api_types::{Page, PageParams};

use crate::error::FetchError;

/// Source of pages for one feed.
///
/// Implementations own transport concerns such as URLs, timeouts and
/// response-shape normalization; feeds only ever see a [`Page`].
#[async_trait]
pub trait PageFetcher<T, F>: Send + Sync {
    async fn fetch(&self, params: PageParams<F>) -> Result<Page<T>, FetchError>;

    /// Fetch for data known to be stale; caching layers must not answer
    /// from what they hold.
    async fn refetch(&self, params: PageParams<F>) -> Result<Page<T>, FetchError>
    where
        F: Send + 'static,
    {
        self.fetch(params).await
    }
}

/// Adapts an async closure into a [`PageFetcher`].
pub struct FnFetcher<Func> {
    func: Func,
}

impl<Func> FnFetcher<Func> {
    pub fn new(func: Func) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<T, F, Func, Fut> PageFetcher<T, F> for FnFetcher<Func>
where
    T: Send + 'static,
    F: Send + 'static,
    Func: Fn(PageParams<F>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page<T>, FetchError>> + Send,
{
    async fn fetch(&self, params: PageParams<F>) -> Result<Page<T>, FetchError> {
        (self.func)(params).await
    }
}
