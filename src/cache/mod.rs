//! Response cache for paginated feeds.
//!
//! Pages fetched from the backend are stored under string keys built by
//! [`CacheKey::build`], expire after a per-family TTL, and are purged by key
//! substring when a mutation makes them stale.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `eventfeed.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! cleanup_interval_secs = 60
//! ttl_events_secs = 300
//! # ... see config.rs for all options
//! ```

mod config;
mod hooks;
mod keys;
pub(crate) mod lock;
mod planner;
mod registry;
mod store;

pub use config::{CacheConfig, TtlTable};
pub use hooks::{CacheInvalidator, FeedReloader, InvalidationReport};
pub use keys::{CacheFamily, CacheKey, CacheScope};
pub use planner::{InvalidationPlan, Mutation};
pub use registry::CacheRegistry;
pub use store::CacheStats;
