use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use vigil_domain::{CoreError, Query, Record, RecordKey};

/// Result stream of a storage query: a bounded record channel plus a
/// cancellation token. The backend iterates on its own task; the consumer
/// cancels by triggering the token. Backends abort with a timeout error
/// when the consumer stalls for more than a second.
pub struct QueryIterator {
    pub records: mpsc::Receiver<Record>,
    done: CancellationToken,
}

impl QueryIterator {
    pub fn new(records: mpsc::Receiver<Record>, done: CancellationToken) -> Self {
        Self { records, done }
    }

    pub async fn next(&mut self) -> Option<Record> {
        self.records.recv().await
    }

    /// Drain the remaining records into a vector.
    pub async fn collect_all(mut self) -> Vec<Record> {
        let mut out = Vec::new();
        while let Some(record) = self.records.recv().await {
            out.push(record);
        }
        out
    }

    /// Stop the producing task; remaining buffered records may still be
    /// received.
    pub fn cancel(&self) {
        self.done.cancel();
    }
}

impl Drop for QueryIterator {
    fn drop(&mut self) {
        self.done.cancel();
    }
}

/// Write half of a batched put: records go into `input`, the final result
/// arrives on `errors` once the channel is closed.
pub struct BatchSink {
    pub input: mpsc::Sender<Record>,
    pub errors: oneshot::Receiver<Result<(), CoreError>>,
}

/// Uniform contract of a storage backend.
///
/// Absence of a key is the `NotFound` sentinel, never a fatal error.
/// Optional capabilities (batching, purging, maintenance) default to
/// `NotImplemented` / no-ops so simple backends stay simple.
#[async_trait]
pub trait StorageInterface: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Record, CoreError>;

    /// Store a record, returning it with updated metadata.
    async fn put(&self, record: Record) -> Result<Record, CoreError>;

    async fn delete(&self, key: &RecordKey) -> Result<(), CoreError>;

    /// Run a checked query. `allow_local` and `allow_internal` gate access
    /// to records flagged secret / crownjewel.
    async fn query(
        &self,
        query: &Query,
        allow_local: bool,
        allow_internal: bool,
    ) -> Result<QueryIterator, CoreError>;

    async fn shutdown(&self) -> Result<(), CoreError>;

    /// Batched writes ("batcher" capability).
    async fn put_many(&self) -> Result<BatchSink, CoreError> {
        Err(CoreError::NotImplemented("put_many"))
    }

    /// Bulk delete by query ("purger" capability). Returns the number of
    /// removed records.
    async fn purge(&self, _query: &Query) -> Result<u64, CoreError> {
        Err(CoreError::NotImplemented("purge"))
    }

    async fn maintain(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn maintain_thorough(&self) -> Result<(), CoreError> {
        Ok(())
    }

    /// Expire and purge by record state: records shadow-deleted before
    /// `purge_deleted_before` are removed; expired records are deleted,
    /// as a shadow delete when `shadow_delete` is set.
    async fn maintain_record_states(
        &self,
        _purge_deleted_before: i64,
        _shadow_delete: bool,
    ) -> Result<(), CoreError> {
        Ok(())
    }
}
