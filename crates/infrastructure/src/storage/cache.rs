use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use vigil_application::ports::{BatchSink, QueryIterator, StorageInterface};
use vigil_domain::{CoreError, Query, Record, RecordKey};

/// Threshold check cadence.
const THRESHOLD_TICK: Duration = Duration::from_secs(5);
/// Unconditional flush cadence.
const FORCE_FLUSH_TICK: Duration = Duration::from_secs(300);

/// LRU read cache with a write-deferral buffer in front of a backend.
///
/// Writes land in the cache and the buffer; a single background worker
/// drains the buffer on three triggers (eviction pulse, a 5 s threshold
/// check, a 5 min forced flush). Evicting a key with a pending write
/// writes that record through synchronously, because the next reader
/// must not observe stale absent-from-cache state.
///
/// Lock order is fixed: read cache, then write buffer. The writer loop
/// takes them in the same order.
pub struct DelayedStorage {
    backend: Arc<dyn StorageInterface>,
    read_cache: Mutex<LruCache<String, Record>>,
    write_buffer: Mutex<HashMap<String, Record>>,
    flush_signal: Notify,
    capacity: usize,
    threshold_percent: usize,
}

impl DelayedStorage {
    pub fn new(
        backend: Arc<dyn StorageInterface>,
        capacity: usize,
        threshold_percent: usize,
    ) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            backend,
            read_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).expect("capacity is non-zero"),
            )),
            write_buffer: Mutex::new(HashMap::new()),
            flush_signal: Notify::new(),
            capacity,
            threshold_percent,
        })
    }

    pub fn backend(&self) -> &Arc<dyn StorageInterface> {
        &self.backend
    }

    /// Start the delayed-writer worker. It exits after a final
    /// unconditional flush once `shutdown` fires.
    pub fn start_writer(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            info!("Delayed cache writer started");
            let mut threshold_tick = tokio::time::interval(THRESHOLD_TICK);
            let mut force_tick = tokio::time::interval(FORCE_FLUSH_TICK);
            // The first tick of an interval fires immediately.
            threshold_tick.tick().await;
            force_tick.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        if let Err(e) = this.flush_write_cache(0).await {
                            error!(error = %e, "Final write-cache flush failed");
                        }
                        info!("Delayed cache writer stopped");
                        return;
                    }
                    _ = this.flush_signal.notified() => {
                        if let Err(e) = this.flush_write_cache(0).await {
                            error!(error = %e, "Signalled write-cache flush failed");
                        }
                    }
                    _ = threshold_tick.tick() => {
                        if let Err(e) = this.flush_write_cache(this.threshold_percent).await {
                            error!(error = %e, "Threshold write-cache flush failed");
                        }
                    }
                    _ = force_tick.tick() => {
                        if let Err(e) = this.flush_write_cache(0).await {
                            error!(error = %e, "Forced write-cache flush failed");
                        }
                    }
                }
            }
        })
    }

    /// Flush the write buffer if its fill ratio reaches
    /// `percent_threshold` of the cache capacity (0 flushes always).
    pub async fn flush_write_cache(&self, percent_threshold: usize) -> Result<(), CoreError> {
        let pending: Vec<Record> = {
            let buffer = self.write_buffer.lock().expect("write buffer lock");
            if buffer.len() * 100 < self.capacity * percent_threshold {
                return Ok(());
            }
            buffer.values().cloned().collect()
        };
        if pending.is_empty() {
            return Ok(());
        }

        let count = pending.len();
        match self.backend.put_many().await {
            Ok(BatchSink { input, errors }) => {
                for record in &pending {
                    if input.send(record.clone()).await.is_err() {
                        return Err(CoreError::Storage("batch sink closed".to_string()));
                    }
                }
                drop(input);
                errors
                    .await
                    .map_err(|_| CoreError::Storage("batch worker vanished".to_string()))??;
            }
            Err(CoreError::NotImplemented(_)) => {
                for record in &pending {
                    self.backend.put(record.clone()).await?;
                }
            }
            Err(e) => return Err(e),
        }

        // Only drop entries that were not overwritten while we flushed.
        let mut buffer = self.write_buffer.lock().expect("write buffer lock");
        for record in pending {
            if let Some(current) = buffer.get(&record.key.to_string()) {
                if current.meta.modified == record.meta.modified {
                    buffer.remove(&record.key.to_string());
                }
            }
        }
        debug!(count, "Write cache flushed");
        Ok(())
    }

    /// Insert into the read cache; a displaced entry with a pending write
    /// is returned for synchronous write-through.
    fn cache_insert(&self, record: Record) -> Option<Record> {
        let inserted_key = record.key.to_string();
        let evicted = {
            let mut cache = self.read_cache.lock().expect("read cache lock");
            cache.push(inserted_key.clone(), record)
        };
        let (evicted_key, evicted_record) = evicted?;
        // push also returns the old value on same-key replacement, which
        // is not an eviction.
        if evicted_key == inserted_key {
            return None;
        }

        let mut buffer = self.write_buffer.lock().expect("write buffer lock");
        buffer.remove(&evicted_key).map(|_| evicted_record)
    }

    async fn write_through(&self, record: Record) -> Result<(), CoreError> {
        self.backend.put(record).await?;
        // Kick a full flush; the signal is single-slot and coalesces.
        self.flush_signal.notify_one();
        Ok(())
    }

    /// Drop the whole read cache, writing pending entries through. Used on
    /// shutdown and by tests exercising the durability contract.
    pub async fn clear_cache(&self) -> Result<(), CoreError> {
        let pending: Vec<Record> = {
            let mut cache = self.read_cache.lock().expect("read cache lock");
            let mut buffer = self.write_buffer.lock().expect("write buffer lock");
            let mut pending = Vec::new();
            while let Some((key, record)) = cache.pop_lru() {
                if buffer.remove(&key).is_some() {
                    pending.push(record);
                }
            }
            pending
        };
        for record in pending {
            self.backend.put(record).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageInterface for DelayedStorage {
    async fn get(&self, key: &RecordKey) -> Result<Record, CoreError> {
        let key_str = key.to_string();
        {
            let mut cache = self.read_cache.lock().expect("read cache lock");
            if let Some(record) = cache.get(&key_str) {
                return Ok(record.clone());
            }
        }

        let record = self.backend.get(key).await?;
        if let Some(displaced) = self.cache_insert(record.clone()) {
            self.write_through(displaced).await?;
        }
        Ok(record)
    }

    async fn put(&self, mut record: Record) -> Result<Record, CoreError> {
        record.meta.touch();

        let displaced = {
            let displaced = self.cache_insert(record.clone());
            let mut buffer = self.write_buffer.lock().expect("write buffer lock");
            buffer.insert(record.key.to_string(), record.clone());
            displaced
        };
        if let Some(displaced) = displaced {
            self.write_through(displaced).await?;
        }
        Ok(record)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), CoreError> {
        {
            let mut cache = self.read_cache.lock().expect("read cache lock");
            cache.pop(&key.to_string());
            let mut buffer = self.write_buffer.lock().expect("write buffer lock");
            buffer.remove(&key.to_string());
        }
        self.backend.delete(key).await
    }

    async fn query(
        &self,
        query: &Query,
        allow_local: bool,
        allow_internal: bool,
    ) -> Result<QueryIterator, CoreError> {
        // The backend is authoritative for queries; push pending writes
        // down first.
        self.flush_write_cache(0).await?;
        self.backend.query(query, allow_local, allow_internal).await
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        self.clear_cache().await?;
        self.flush_write_cache(0).await?;
        self.backend.shutdown().await
    }

    async fn put_many(&self) -> Result<BatchSink, CoreError> {
        self.backend.put_many().await
    }

    async fn purge(&self, query: &Query) -> Result<u64, CoreError> {
        self.flush_write_cache(0).await?;
        self.backend.purge(query).await
    }

    async fn maintain(&self) -> Result<(), CoreError> {
        self.backend.maintain().await
    }

    async fn maintain_thorough(&self) -> Result<(), CoreError> {
        self.flush_write_cache(0).await?;
        self.backend.maintain_thorough().await
    }

    async fn maintain_record_states(
        &self,
        purge_deleted_before: i64,
        shadow_delete: bool,
    ) -> Result<(), CoreError> {
        self.backend
            .maintain_record_states(purge_deleted_before, shadow_delete)
            .await
    }
}
