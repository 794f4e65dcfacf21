use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::feed::FeedKind;

const DEFAULT_PAGES: u32 = 1;

/// Command-line arguments for the eventfeed binary.
#[derive(Debug, Parser)]
#[command(name = "eventfeed", version, about = "Browse event feeds through the response cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "EVENTFEED_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Walk one of the event feeds.
    Browse(BrowseArgs),
    /// Walk the events near a location.
    Nearby(NearbyArgs),
    /// Walk the admin user listing.
    #[command(name = "admin-users")]
    AdminUsers(AdminUsersArgs),
}

impl Command {
    pub fn overrides(&self) -> &RunOverrides {
        match self {
            Command::Browse(args) => &args.overrides,
            Command::Nearby(args) => &args.overrides,
            Command::AdminUsers(args) => &args.overrides,
        }
    }

    pub fn pages(&self) -> u32 {
        match self {
            Command::Browse(args) => args.pages,
            Command::Nearby(args) => args.pages,
            Command::AdminUsers(args) => args.pages,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct BrowseArgs {
    /// Feed to walk (events, created, rsvped, organized, moderated, admin-events).
    #[arg(value_name = "FEED")]
    pub feed: FeedKind,

    /// Number of pages to load, first page included.
    #[arg(long, default_value_t = DEFAULT_PAGES)]
    pub pages: u32,

    #[command(flatten)]
    pub filters: EventFilterArgs,

    #[command(flatten)]
    pub overrides: RunOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct NearbyArgs {
    #[arg(long)]
    pub city: String,

    #[arg(long)]
    pub state: String,

    /// Number of pages to load, first page included.
    #[arg(long, default_value_t = DEFAULT_PAGES)]
    pub pages: u32,

    #[command(flatten)]
    pub overrides: RunOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct AdminUsersArgs {
    #[arg(long)]
    pub role: Option<String>,

    #[arg(long)]
    pub profession: Option<String>,

    /// Number of pages to load, first page included.
    #[arg(long, default_value_t = DEFAULT_PAGES)]
    pub pages: u32,

    #[command(flatten)]
    pub overrides: RunOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct EventFilterArgs {
    #[arg(long = "filter-city", value_name = "CITY")]
    pub city: Option<String>,

    #[arg(long = "filter-state", value_name = "STATE")]
    pub state: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long = "online", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub is_online: Option<bool>,

    #[arg(long = "creator-email", value_name = "EMAIL")]
    pub creator_email: Option<String>,

    #[arg(long = "start-date", value_name = "DATE")]
    pub start_date: Option<String>,

    #[arg(long = "end-date", value_name = "DATE")]
    pub end_date: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the response cache.
    #[arg(
        long = "cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default page size.
    #[arg(long = "page-size", value_name = "N")]
    pub page_size: Option<u32>,

    /// Override the API base URL.
    #[arg(long = "api-base-url", value_name = "URL", value_hint = ValueHint::Url)]
    pub api_base_url: Option<String>,

    /// Override the API request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS")]
    pub api_timeout_seconds: Option<u64>,

    /// Bearer token sent with every API request.
    #[arg(long = "api-token", env = "EVENTFEED_API_TOKEN", value_name = "TOKEN")]
    pub api_token: Option<String>,
}
