//! Per-feed pagination state machine.
//!
//! Every replacing request (`fetch_initial`, `refresh`, `reset`) advances the
//! feed's generation. A response is written only if the generation it was
//! issued under is still current, so a slow earlier request can never
//! overwrite a newer one or repopulate a feed that was reset meanwhile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use eventfeed_api_types::{Direction, PageParams};
use metrics::histogram;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::cache::lock::mutex_lock;

use super::fetcher::PageFetcher;
use super::state::{DEFAULT_PAGE_SIZE, FeedOutcome, FeedState};
use super::{FeedItem, FeedKind};

const SOURCE: &str = "feed::machine";
const METRIC_FEED_FETCH_MS: &str = "eventfeed_feed_fetch_ms";

pub struct Feed<T: FeedItem, F> {
    kind: FeedKind,
    failure_message: String,
    initial: Arc<dyn PageFetcher<T, F>>,
    more: Arc<dyn PageFetcher<T, F>>,
    default_page_size: u32,
    generation: AtomicU64,
    state: watch::Sender<FeedState<T>>,
    last_params: Mutex<Option<PageParams<F>>>,
}

impl<T, F> Feed<T, F>
where
    T: FeedItem,
    F: Clone + Send + Sync + 'static,
{
    /// A feed that uses the same fetcher for first and subsequent pages.
    pub fn new(kind: FeedKind, fetcher: Arc<dyn PageFetcher<T, F>>) -> Self {
        Self::with_fetchers(kind, Arc::clone(&fetcher), fetcher)
    }

    pub fn with_fetchers(
        kind: FeedKind,
        initial: Arc<dyn PageFetcher<T, F>>,
        more: Arc<dyn PageFetcher<T, F>>,
    ) -> Self {
        Self {
            kind,
            failure_message: kind.failure_message().to_string(),
            initial,
            more,
            default_page_size: DEFAULT_PAGE_SIZE,
            generation: AtomicU64::new(0),
            state: watch::Sender::new(FeedState::default()),
            last_params: Mutex::new(None),
        }
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    pub fn snapshot(&self) -> FeedState<T> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<FeedState<T>> {
        self.state.subscribe()
    }

    /// Load the first page, replacing whatever the feed holds.
    ///
    /// The cursor is ignored and the page size falls back to the feed
    /// default.
    #[instrument(skip_all, fields(feed = %self.kind))]
    pub async fn fetch_initial(&self, params: PageParams<F>) -> FeedOutcome {
        self.load_first_page(params, "fetch_initial", false).await
    }

    /// Same transition as [`Feed::fetch_initial`], for data known to be stale.
    ///
    /// Goes through [`PageFetcher::refetch`], so a caching fetcher asks the
    /// server again instead of answering from its stored page.
    #[instrument(skip_all, fields(feed = %self.kind))]
    pub async fn refresh(&self, params: PageParams<F>) -> FeedOutcome {
        self.load_first_page(params, "refresh", true).await
    }

    /// Append the page at `params.cursor`.
    ///
    /// Callers pass the feed's current `next_cursor`; the feed does not
    /// validate it. Skipped while a first-page load is in flight.
    #[instrument(skip_all, fields(feed = %self.kind))]
    pub async fn load_more(&self, mut params: PageParams<F>) -> FeedOutcome {
        let generation = self.generation.load(Ordering::SeqCst);
        params.page_size.get_or_insert(self.default_page_size);

        let mut started = false;
        self.state.send_if_modified(|state| {
            if state.loading {
                return false;
            }
            state.loading_more = true;
            started = true;
            true
        });
        if !started {
            debug!(feed = %self.kind, "Skipping load more while first page is loading");
            return FeedOutcome::Skipped;
        }

        let started_at = Instant::now();
        let result = self.more.fetch(params).await;
        self.record_latency(started_at);
        if let Err(err) = &result {
            warn!(feed = %self.kind, generation, error = %err, "Load more failed");
        }

        let mut outcome = FeedOutcome::Stale;
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            outcome = match result {
                Ok(page) => {
                    let added = state.append_page(page);
                    debug!(feed = %self.kind, added, total = state.items.len(), "Appended page");
                    FeedOutcome::Applied
                }
                Err(_) => {
                    state.loading_more = false;
                    state.error = Some(self.failure_message.clone());
                    FeedOutcome::Failed
                }
            };
            true
        });

        if outcome == FeedOutcome::Stale {
            debug!(feed = %self.kind, generation, "Discarded superseded page");
        }
        outcome
    }

    /// Fetch the page after the current one if there is one and nothing
    /// else is loading.
    pub async fn load_next(&self, filters: F) -> FeedOutcome {
        let params = {
            let state = self.state.borrow();
            match &state.next_cursor {
                Some(cursor) if state.has_next && !state.loading && !state.loading_more => {
                    PageParams::first_page(filters)
                        .with_cursor(cursor.clone())
                        .with_page_size(state.page_size)
                }
                _ => return FeedOutcome::Skipped,
            }
        };
        self.load_more(params).await
    }

    /// Restore the default state and forget the last parameters, so a later
    /// [`Feed::reload`] is skipped. Responses still in flight are discarded.
    pub fn reset(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        mutex_lock(&self.last_params, SOURCE, "reset").take();
        self.state.send_replace(FeedState::default());
        debug!(feed = %self.kind, generation, "Feed reset");
    }

    /// Reset and load the first page again under the parameters of the last
    /// first-page load. Skipped if there was none since the last reset.
    pub async fn reload(&self) -> FeedOutcome {
        let params = mutex_lock(&self.last_params, SOURCE, "reload").clone();
        match params {
            Some(params) => {
                self.reset();
                self.refresh(params).await
            }
            None => FeedOutcome::Skipped,
        }
    }

    /// Optimistically put `item` first. An item with the same id is moved
    /// rather than duplicated.
    pub fn insert_local(&self, item: T) {
        self.state.send_modify(|state| state.prepend(item));
    }

    pub fn remove_local(&self, id: &T::Id) -> bool {
        self.state.send_if_modified(|state| state.remove(id))
    }

    /// Edit one item in place; returns whether it was found.
    pub fn update_local(&self, id: &T::Id, update: impl FnOnce(&mut T)) -> bool {
        self.state.send_if_modified(|state| {
            match state.items.iter_mut().find(|item| item.id() == *id) {
                Some(item) => {
                    update(item);
                    true
                }
                None => false,
            }
        })
    }

    async fn load_first_page(
        &self,
        mut params: PageParams<F>,
        op: &'static str,
        bypass_cache: bool,
    ) -> FeedOutcome {
        params.cursor = None;
        params.direction = Direction::Next;
        params.page_size.get_or_insert(self.default_page_size);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *mutex_lock(&self.last_params, SOURCE, op) = Some(params.clone());
        self.state.send_modify(FeedState::begin_load);

        let started_at = Instant::now();
        let result = if bypass_cache {
            self.initial.refetch(params).await
        } else {
            self.initial.fetch(params).await
        };
        self.record_latency(started_at);
        if let Err(err) = &result {
            warn!(feed = %self.kind, op, generation, error = %err, "First page fetch failed");
        }

        let mut outcome = FeedOutcome::Stale;
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            outcome = match result {
                Ok(page) => {
                    state.replace_page(page);
                    FeedOutcome::Applied
                }
                Err(_) => {
                    state.loading = false;
                    state.error = Some(self.failure_message.clone());
                    FeedOutcome::Failed
                }
            };
            true
        });

        if outcome == FeedOutcome::Stale {
            debug!(feed = %self.kind, op, generation, "Discarded superseded page");
        }
        outcome
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn record_latency(&self, started_at: Instant) {
        histogram!(METRIC_FEED_FETCH_MS, "feed" => self.kind.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
    }
}
