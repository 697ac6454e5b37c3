use async_trait::async_trait;

use vigil_application::ports::{QueryIterator, StorageInterface};
use vigil_domain::{CoreError, Query, Record, RecordKey};

use super::spawn_iteration;

/// Accepts every write and stores nothing. Useful for databases a
/// deployment wants disabled without touching call sites.
pub struct SinkholeStorage;

#[async_trait]
impl StorageInterface for SinkholeStorage {
    async fn get(&self, _key: &RecordKey) -> Result<Record, CoreError> {
        Err(CoreError::NotFound)
    }

    async fn put(&self, record: Record) -> Result<Record, CoreError> {
        Ok(record)
    }

    async fn delete(&self, _key: &RecordKey) -> Result<(), CoreError> {
        Ok(())
    }

    async fn query(
        &self,
        query: &Query,
        _allow_local: bool,
        _allow_internal: bool,
    ) -> Result<QueryIterator, CoreError> {
        Ok(spawn_iteration(Vec::new(), query))
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
