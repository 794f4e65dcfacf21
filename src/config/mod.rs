//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::cache::TtlTable;

mod cli;

pub use cli::{
    AdminUsersArgs, BrowseArgs, CliArgs, Command, EventFilterArgs, NearbyArgs, RunOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "eventfeed";
const ENV_PREFIX: &str = "EVENTFEED";
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_PAGE_SIZE: u32 = 12;
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/";
const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub feeds: FeedSettings,
    pub api: ApiSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub cleanup_interval: Duration,
    pub ttl: TtlTable,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub default_page_size: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Always ends with `/` so feed paths join beneath it.
    pub base_url: Url,
    pub timeout: Duration,
    pub token: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(cli.command.overrides());

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    feeds: RawFeedSettings,
    api: RawApiSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(page_size) = overrides.page_size {
            self.feeds.default_page_size = Some(page_size);
        }
        if let Some(url) = overrides.api_base_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(seconds) = overrides.api_timeout_seconds {
            self.api.timeout_secs = Some(seconds);
        }
        if let Some(token) = overrides.api_token.as_ref() {
            self.api.token = Some(token.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            feeds,
            api,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let feeds = build_feed_settings(feeds)?;
        let api = build_api_settings(api)?;

        Ok(Self {
            logging,
            cache,
            feeds,
            api,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = TtlTable::default();
    let ttl = TtlTable {
        events: positive_secs(cache.ttl_events_secs, defaults.events, "cache.ttl_events_secs")?,
        user_events: positive_secs(
            cache.ttl_user_events_secs,
            defaults.user_events,
            "cache.ttl_user_events_secs",
        )?,
        nearby_events: positive_secs(
            cache.ttl_nearby_events_secs,
            defaults.nearby_events,
            "cache.ttl_nearby_events_secs",
        )?,
        admin_data: positive_secs(
            cache.ttl_admin_data_secs,
            defaults.admin_data,
            "cache.ttl_admin_data_secs",
        )?,
        friends: positive_secs(
            cache.ttl_friends_secs,
            defaults.friends,
            "cache.ttl_friends_secs",
        )?,
        friend_requests: positive_secs(
            cache.ttl_friend_requests_secs,
            defaults.friend_requests,
            "cache.ttl_friend_requests_secs",
        )?,
        user_search: positive_secs(
            cache.ttl_user_search_secs,
            defaults.user_search,
            "cache.ttl_user_search_secs",
        )?,
        user_profiles: positive_secs(
            cache.ttl_user_profiles_secs,
            defaults.user_profiles,
            "cache.ttl_user_profiles_secs",
        )?,
    };

    let cleanup_interval = positive_secs(
        cache.cleanup_interval_secs,
        Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        "cache.cleanup_interval_secs",
    )?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        cleanup_interval,
        ttl,
    })
}

fn build_feed_settings(feeds: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let page_size = feeds.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    let default_page_size = NonZeroU32::new(page_size)
        .ok_or_else(|| LoadError::invalid("feeds.default_page_size", "must be greater than zero"))?;
    Ok(FeedSettings { default_page_size })
}

fn build_api_settings(api: RawApiSettings) -> Result<ApiSettings, LoadError> {
    let raw_url = api
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_API_BASE_URL);
    let mut base_url = Url::parse(raw_url)
        .map_err(|err| LoadError::invalid("api.base_url", format!("invalid URL `{raw_url}`: {err}")))?;
    if !matches!(base_url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "api.base_url",
            format!("unsupported scheme `{}`", base_url.scheme()),
        ));
    }
    if !base_url.path().ends_with('/') {
        let path = format!("{}/", base_url.path());
        base_url.set_path(&path);
    }

    let timeout = positive_secs(
        api.timeout_secs,
        Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
        "api.timeout_secs",
    )?;

    let token = api.token.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ApiSettings {
        base_url,
        timeout,
        token,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    cleanup_interval_secs: Option<u64>,
    ttl_events_secs: Option<u64>,
    ttl_user_events_secs: Option<u64>,
    ttl_nearby_events_secs: Option<u64>,
    ttl_admin_data_secs: Option<u64>,
    ttl_friends_secs: Option<u64>,
    ttl_friend_requests_secs: Option<u64>,
    ttl_user_search_secs: Option<u64>,
    ttl_user_profiles_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    default_page_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    token: Option<String>,
}

fn positive_secs(
    value: Option<u64>,
    default: Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    match value {
        None => Ok(default),
        Some(0) => Err(LoadError::invalid(key, "must be greater than zero")),
        Some(seconds) => Ok(Duration::from_secs(seconds)),
    }
}
