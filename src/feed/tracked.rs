use std::sync::Mutex;

use eventfeed_api_types::PageParams;
use tracing::debug;

use crate::cache::lock::mutex_lock;

use super::machine::Feed;
use super::state::FeedOutcome;
use super::FeedItem;

const SOURCE: &str = "feed::tracked";

/// A feed bound to the context (location or filters) it was last loaded
/// under.
///
/// Loading under a different context starts over from the first page
/// instead of appending pages from another result set.
pub struct TrackedFeed<T: FeedItem, F> {
    feed: Feed<T, F>,
    context: Mutex<Option<F>>,
}

impl<T, F> TrackedFeed<T, F>
where
    T: FeedItem,
    F: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(feed: Feed<T, F>) -> Self {
        Self {
            feed,
            context: Mutex::new(None),
        }
    }

    pub fn feed(&self) -> &Feed<T, F> {
        &self.feed
    }

    pub fn context(&self) -> Option<F> {
        mutex_lock(&self.context, SOURCE, "context").clone()
    }

    /// Load under `context`: first page when the context changed or nothing
    /// has been fetched yet, otherwise the next page.
    pub async fn load(&self, context: F) -> FeedOutcome {
        let changed = {
            let mut current = mutex_lock(&self.context, SOURCE, "load");
            if current.as_ref() == Some(&context) {
                false
            } else {
                *current = Some(context.clone());
                true
            }
        };

        if changed {
            debug!(feed = %self.feed.kind(), "Context changed; starting over");
            self.feed.reset();
            return self.feed.fetch_initial(PageParams::first_page(context)).await;
        }

        let state = self.feed.snapshot();
        if !state.has_fetched && !state.loading {
            return self.feed.fetch_initial(PageParams::first_page(context)).await;
        }
        self.feed.load_next(context).await
    }

    pub async fn reload(&self) -> FeedOutcome {
        self.feed.reload().await
    }

    /// Reset the feed and forget the context.
    pub fn reset(&self) {
        *mutex_lock(&self.context, SOURCE, "reset") = None;
        self.feed.reset();
    }
}
