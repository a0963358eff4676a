//! Read-through cache accessor.
//!
//! ```text
//! fetch(key) ── lookup (lookup_timeout) ── hit ──────────────► (payload, cache)
//!                    │ miss / error / timeout / corrupt
//!                    ▼
//!               origin (query_timeout) ──► (payload, origin)
//!                    │
//!                    └─► CacheWriter::submit(key, payload as cached, ttl)   [detached]
//! ```
//!
//! Cache problems never reach the caller. Origin failures do, as
//! `StorageError`, and are distinct from an empty result.

use std::future::Future;
use std::time::Duration;

use futures_util::TryStreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use storefront_storage::{DynDocumentStore, StorageError};

use super::backend::DynCacheStore;
use super::writer::CacheWriter;
use crate::listing::{CachedListing, ListingResource, PayloadSource};

/// A payload that can be stored in the cache.
pub trait CachePayload: Serialize + DeserializeOwned + Send {
    /// The form written to the cache.
    fn cached_form(&self) -> Self;

    /// Entries failing this check are treated as misses.
    fn is_well_formed(&self) -> bool {
        true
    }
}

impl CachePayload for CachedListing {
    fn cached_form(&self) -> Self {
        self.for_cache()
    }

    fn is_well_formed(&self) -> bool {
        self.is_consistent()
    }
}

impl CachePayload for Map<String, Value> {
    fn cached_form(&self) -> Self {
        self.clone()
    }
}

/// Cache-first reads against a document store.
///
/// Holds shared handles only; cloning is cheap.
#[derive(Clone)]
pub struct ReadThroughCache {
    cache: DynCacheStore,
    store: DynDocumentStore,
    writer: CacheWriter,
    lookup_timeout: Duration,
    query_timeout: Duration,
}

impl std::fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("store", &self.store.backend_name())
            .field("lookup_timeout", &self.lookup_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl ReadThroughCache {
    pub fn new(cache: DynCacheStore, store: DynDocumentStore, writer: CacheWriter) -> Self {
        Self {
            cache,
            store,
            writer,
            lookup_timeout: Duration::from_millis(250),
            query_timeout: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn writer(&self) -> &CacheWriter {
        &self.writer
    }

    /// Cache-first read of `key`; on a miss runs `origin` and schedules
    /// repopulation with `ttl`.
    ///
    /// # Errors
    ///
    /// Returns the origin's error, or `StorageError::Timeout` if the origin
    /// exceeds the query timeout.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        origin: F,
    ) -> Result<(T, PayloadSource), StorageError>
    where
        T: CachePayload,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        if let Some(hit) = self.lookup::<T>(key).await {
            return Ok((hit, PayloadSource::Cache));
        }

        let payload = self.run_origin(key, origin()).await?;
        self.repopulate(key, &payload.cached_form(), ttl);
        Ok((payload, PayloadSource::Origin))
    }

    /// Reads a listing resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin query fails or times out.
    pub async fn fetch_listing(
        &self,
        resource: &ListingResource,
    ) -> Result<CachedListing, StorageError> {
        let (mut listing, source) = self
            .fetch(&resource.cache_key, resource.ttl, || {
                load_listing(&self.store, resource)
            })
            .await?;
        listing.source = source;
        Ok(listing)
    }

    /// Reads one document's fields. Missing documents are not cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin read fails or times out.
    pub async fn fetch_document(
        &self,
        key: &str,
        collection: &str,
        id: &str,
        ttl: Duration,
    ) -> Result<Option<(Map<String, Value>, PayloadSource)>, StorageError> {
        if let Some(hit) = self.lookup::<Map<String, Value>>(key).await {
            return Ok(Some((hit, PayloadSource::Cache)));
        }

        let document = self
            .run_origin(key, self.store.get_document(collection, id))
            .await?;

        Ok(document.map(|doc| {
            let fields = doc.fields;
            self.repopulate(key, &fields, ttl);
            (fields, PayloadSource::Origin)
        }))
    }

    async fn lookup<T: CachePayload>(&self, key: &str) -> Option<T> {
        let bytes = match tokio::time::timeout(self.lookup_timeout, self.cache.get(key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => {
                tracing::debug!(key = %key, "cache miss");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "Cache lookup failed, reading origin");
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    key = %key,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Cache lookup timed out, reading origin"
                );
                return None;
            }
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(payload) if payload.is_well_formed() => {
                tracing::debug!(key = %key, "cache hit");
                Some(payload)
            }
            Ok(_) => {
                tracing::warn!(key = %key, "Ignoring inconsistent cache entry");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Ignoring corrupt cache entry");
                None
            }
        }
    }

    async fn run_origin<T>(
        &self,
        key: &str,
        origin: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        match tokio::time::timeout(self.query_timeout, origin).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(e)) => {
                tracing::error!(key = %key, category = %e.category(), error = %e, "Origin query failed");
                Err(e)
            }
            Err(_) => {
                tracing::error!(
                    key = %key,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Origin query timed out"
                );
                Err(StorageError::timeout(self.query_timeout))
            }
        }
    }

    fn repopulate<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) {
        match serde_json::to_vec(payload) {
            Ok(bytes) => self.writer.submit(key, bytes, ttl),
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to encode cache entry"),
        }
    }
}

/// Streams the resource's collection in order and projects the field.
async fn load_listing(
    store: &DynDocumentStore,
    resource: &ListingResource,
) -> Result<CachedListing, StorageError> {
    let query = resource.query();
    let mut documents = store.list_collection(&query);
    let mut list = Vec::new();
    while let Some(document) = documents.try_next().await? {
        if let Some(value) = resource.project(&document) {
            list.push(value);
        }
    }
    Ok(CachedListing::from_origin(list))
}
