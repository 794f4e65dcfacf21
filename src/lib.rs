//! Incremental feed loading over cursor-paginated endpoints, fronted by a
//! TTL response cache with substring invalidation.

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod infra;
