//! Background cache writer.
//!
//! Requests hand repopulation writes to [`CacheWriter::submit`] and return
//! immediately. A dispatcher task owns the queue and runs each write on its
//! own task, at most `workers` at a time, each bounded by `write_timeout`.
//! Writes are never tied to the request that produced them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::backend::DynCacheStore;

/// One pending cache write.
#[derive(Debug)]
pub struct CacheWrite {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Duration,
}

/// Counters for the writer.
#[derive(Debug, Default)]
pub struct WriterStats {
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl WriterStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub write_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            write_timeout: Duration::from_secs(2),
        }
    }
}

struct Dispatcher {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Handle for submitting background cache writes. Cheap to clone.
#[derive(Clone)]
pub struct CacheWriter {
    tx: mpsc::Sender<CacheWrite>,
    dispatcher: Arc<Mutex<Option<Dispatcher>>>,
    stats: Arc<WriterStats>,
}

impl std::fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl CacheWriter {
    /// Starts the dispatcher on the current runtime.
    pub fn spawn(cache: DynCacheStore, config: WriterConfig) -> Self {
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(WriterStats::default());

        let handle = tokio::spawn(dispatch(
            rx,
            shutdown_rx,
            cache,
            workers,
            config.write_timeout,
            Arc::clone(&stats),
        ));

        Self {
            tx,
            dispatcher: Arc::new(Mutex::new(Some(Dispatcher {
                shutdown_tx,
                handle,
            }))),
            stats,
        }
    }

    /// Queues a write without waiting. A full or closed queue drops it.
    pub fn submit(&self, key: impl Into<String>, value: Vec<u8>, ttl: Duration) {
        let write = CacheWrite {
            key: key.into(),
            value,
            ttl,
        };
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.tx.try_send(write) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            let (reason, write) = match err {
                mpsc::error::TrySendError::Full(w) => ("queue full", w),
                mpsc::error::TrySendError::Closed(w) => ("writer shut down", w),
            };
            tracing::warn!(key = %write.key, reason, "Dropped cache write");
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    /// Stops accepting writes, finishes the queued ones and waits for all
    /// in-flight writes. Later calls are no-ops.
    pub async fn shutdown(&self) {
        let Some(dispatcher) = self.dispatcher.lock().await.take() else {
            return;
        };
        let _ = dispatcher.shutdown_tx.send(());
        if let Err(e) = dispatcher.handle.await {
            tracing::error!(error = %e, "Cache writer dispatcher failed");
        }
        tracing::info!(
            written = self.stats.written(),
            failed = self.stats.failed(),
            dropped = self.stats.dropped(),
            "Cache writer drained"
        );
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<CacheWrite>,
    mut shutdown_rx: oneshot::Receiver<()>,
    cache: DynCacheStore,
    workers: usize,
    write_timeout: Duration,
    stats: Arc<WriterStats>,
) {
    let permits = Arc::new(Semaphore::new(workers));

    loop {
        let write = tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            write = rx.recv() => match write {
                Some(write) => write,
                None => break,
            },
        };
        start_write(write, &permits, &cache, write_timeout, &stats).await;
    }

    // Drain what was queued before the close.
    rx.close();
    while let Some(write) = rx.recv().await {
        start_write(write, &permits, &cache, write_timeout, &stats).await;
    }

    // All permits back means no write is in flight.
    let _ = permits.acquire_many(workers as u32).await;
}

async fn start_write(
    write: CacheWrite,
    permits: &Arc<Semaphore>,
    cache: &DynCacheStore,
    write_timeout: Duration,
    stats: &Arc<WriterStats>,
) {
    let Ok(permit) = Arc::clone(permits).acquire_owned().await else {
        return;
    };
    let cache = Arc::clone(cache);
    let stats = Arc::clone(stats);

    tokio::spawn(async move {
        let _permit = permit;
        let result = tokio::time::timeout(
            write_timeout,
            cache.set(&write.key, write.value, write.ttl),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %write.key, ttl_secs = write.ttl.as_secs(), "Cache repopulated");
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %write.key, error = %e, "Cache write failed");
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %write.key,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "Cache write timed out"
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{CacheBackend, CacheError, CacheStore};
    use async_trait::async_trait;

    struct StalledCache;

    #[async_trait]
    impl CacheStore for StalledCache {
        async fn get(&self, _key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_writes() {
        let backend = CacheBackend::new_local();
        let writer = CacheWriter::spawn(Arc::new(backend.clone()), WriterConfig::default());

        for i in 0..20 {
            writer.submit(format!("key:{i}"), b"v".to_vec(), Duration::from_secs(60));
        }
        writer.shutdown().await;

        assert_eq!(writer.stats().written(), 20);
        assert!(backend.get("key:19").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_dropped() {
        let writer = CacheWriter::spawn(Arc::new(CacheBackend::new_local()), WriterConfig::default());
        writer.shutdown().await;
        writer.submit("late", b"v".to_vec(), Duration::from_secs(60));
        assert_eq!(writer.stats().dropped(), 1);
        writer.shutdown().await;
    }

    #[tokio::test]
    async fn test_write_timeout_is_counted_as_failure() {
        let config = WriterConfig {
            workers: 2,
            queue_capacity: 8,
            write_timeout: Duration::from_millis(20),
        };
        let writer = CacheWriter::spawn(Arc::new(StalledCache), config);
        writer.submit("k1", b"v".to_vec(), Duration::from_secs(60));
        writer.submit("k2", b"v".to_vec(), Duration::from_secs(60));
        writer.shutdown().await;
        assert_eq!(writer.stats().failed(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_writes() {
        let config = WriterConfig {
            workers: 1,
            queue_capacity: 1,
            write_timeout: Duration::from_millis(200),
        };
        let writer = CacheWriter::spawn(Arc::new(StalledCache), config);
        for i in 0..10 {
            writer.submit(format!("k{i}"), b"v".to_vec(), Duration::from_secs(60));
        }
        assert!(writer.stats().dropped() > 0);
        writer.shutdown().await;
        assert_eq!(
            writer.stats().written() + writer.stats().failed() + writer.stats().dropped(),
            10
        );
    }
}
