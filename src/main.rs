use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use eventfeed::{
    cache::{CacheConfig, CacheRegistry},
    config::{self, Command, EventFilterArgs},
    error::AppError,
    feed::{Feed, FeedHub, FeedItem, FeedKind, FeedOutcome, FeedState, TrackedFeed},
    infra::{http::ApiClient, telemetry},
};
use eventfeed_api_types::{EventFilters, Location, PageParams, UserFilters};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let registry = Arc::new(CacheRegistry::new(CacheConfig::from(&settings.cache)));
    registry.start();

    let client = ApiClient::new(&settings.api)?;
    let hub = FeedHub::with_cache(
        client.feed_sources()?,
        &registry,
        settings.feeds.default_page_size.get(),
    );

    info!(
        base_url = %client.base_url(),
        cache = settings.cache.enabled,
        page_size = settings.feeds.default_page_size.get(),
        "Starting eventfeed"
    );

    let pages = cli_args.command.pages().max(1);
    let result = match cli_args.command {
        Command::Browse(args) => run_browse(&hub, args.feed, args.filters, pages).await,
        Command::Nearby(args) => {
            walk_tracked(hub.nearby(), Location::new(args.city, args.state), pages).await
        }
        Command::AdminUsers(args) => {
            let filters = UserFilters {
                role: args.role,
                profession: args.profession,
            };
            walk_tracked(hub.admin_users(), filters, pages).await
        }
    };

    let stats = registry.stats();
    info!(
        entries = stats.total_entries,
        expired = stats.expired_entries,
        "Cache statistics"
    );
    registry.stop();

    result
}

async fn run_browse(
    hub: &FeedHub,
    kind: FeedKind,
    filters: EventFilterArgs,
    pages: u32,
) -> Result<(), AppError> {
    let filters = event_filters(filters);
    let ignores_filters = matches!(
        kind,
        FeedKind::Created | FeedKind::Rsvped | FeedKind::Organized | FeedKind::Moderated
    );
    if ignores_filters && !filters.is_empty() {
        warn!(feed = %kind, "Filters are ignored by this feed");
    }

    match kind {
        FeedKind::Events => walk(hub.events(), filters, pages).await,
        FeedKind::Created => walk(hub.created(), (), pages).await,
        FeedKind::Rsvped => walk(hub.rsvped(), (), pages).await,
        FeedKind::Organized => walk(hub.organized(), (), pages).await,
        FeedKind::Moderated => walk(hub.moderated(), (), pages).await,
        FeedKind::AdminEvents => walk_tracked(hub.admin_events(), filters, pages).await,
        FeedKind::Nearby | FeedKind::AdminUsers => Err(AppError::feed(format!(
            "the `{kind}` feed has its own subcommand"
        ))),
    }
}

fn event_filters(args: EventFilterArgs) -> EventFilters {
    EventFilters {
        city: args.city,
        state: args.state,
        category: args.category,
        is_online: args.is_online,
        creator_email: args.creator_email,
        start_date: args.start_date,
        end_date: args.end_date,
    }
}

/// First page, then `pages - 1` further pages while the server has more.
async fn walk<T, F>(feed: &Feed<T, F>, filters: F, pages: u32) -> Result<(), AppError>
where
    T: FeedItem + Serialize,
    F: Clone + Send + Sync + 'static,
{
    let outcome = feed
        .fetch_initial(PageParams::first_page(filters.clone()))
        .await;
    ensure_applied(feed.kind(), outcome, &feed.snapshot())?;

    for _ in 1..pages {
        let outcome = feed.load_next(filters.clone()).await;
        if outcome == FeedOutcome::Skipped {
            break;
        }
        ensure_applied(feed.kind(), outcome, &feed.snapshot())?;
    }

    print_items(feed.kind(), &feed.snapshot())
}

async fn walk_tracked<T, F>(feed: &TrackedFeed<T, F>, context: F, pages: u32) -> Result<(), AppError>
where
    T: FeedItem + Serialize,
    F: Clone + PartialEq + Send + Sync + 'static,
{
    let kind = feed.feed().kind();
    for page in 0..pages {
        let outcome = feed.load(context.clone()).await;
        if page > 0 && outcome == FeedOutcome::Skipped {
            break;
        }
        ensure_applied(kind, outcome, &feed.feed().snapshot())?;
    }

    print_items(kind, &feed.feed().snapshot())
}

fn ensure_applied<T>(
    kind: FeedKind,
    outcome: FeedOutcome,
    state: &FeedState<T>,
) -> Result<(), AppError> {
    match outcome {
        FeedOutcome::Applied => Ok(()),
        FeedOutcome::Failed => Err(AppError::feed(
            state
                .error
                .clone()
                .unwrap_or_else(|| kind.failure_message().to_string()),
        )),
        other => Err(AppError::feed(format!(
            "{kind} feed load finished as {other:?}"
        ))),
    }
}

/// One JSON document per line on stdout.
fn print_items<T: Serialize>(kind: FeedKind, state: &FeedState<T>) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    for item in &state.items {
        let line = serde_json::to_string(item)
            .map_err(|err| AppError::unexpected(format!("failed to encode item: {err}")))?;
        writeln!(stdout, "{line}")
            .map_err(|err| AppError::unexpected(format!("failed to write output: {err}")))?;
    }

    info!(
        feed = %kind,
        items = state.items.len(),
        has_next = state.has_next,
        total = ?state.total_count,
        "Feed walked"
    );
    Ok(())
}
