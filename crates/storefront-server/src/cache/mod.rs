//! Read-through caching in front of the document store.
//!
//! ## Architecture
//!
//! - [`backend`]: the [`CacheStore`] trait and the local / Redis
//!   [`CacheBackend`]
//! - [`writer`]: the detached, bounded [`CacheWriter`] that repopulates
//!   entries after a miss
//! - [`read_through`]: the [`ReadThroughCache`] accessor used by handlers
//!
//! ## Graceful Degradation
//!
//! A slow, failing or corrupt cache only turns hits into misses. If Redis is
//! unreachable at startup the server runs on the local backend.

pub mod backend;
pub mod read_through;
pub mod writer;

pub use backend::{
    CacheBackend, CacheError, CacheStats, CacheStore, CachedEntry, DynCacheStore,
    create_cache_backend,
};
pub use read_through::{CachePayload, ReadThroughCache};
pub use writer::{CacheWrite, CacheWriter, WriterConfig, WriterStats};
