//! # storefront-server
//!
//! HTTP backend for the storefront: cached category and product listings
//! and the authenticated caller's profile.

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod storage;

pub use cache::{
    CacheBackend, CacheStore, CacheWriter, CachedEntry, DynCacheStore, ReadThroughCache,
    create_cache_backend,
};
pub use config::{
    AppConfig, CacheConfig, LoggingConfig, PostgresStorageConfig, RedisConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
pub use error::ApiError;
pub use listing::{CachedListing, ListingResource, Listings, PayloadSource};
pub use observability::init_tracing;
pub use server::{AppState, ServerBuilder, StorefrontServer, build_app};
