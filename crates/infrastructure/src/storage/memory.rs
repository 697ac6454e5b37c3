use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use vigil_application::ports::{QueryIterator, StorageInterface};
use vigil_domain::{CoreError, Query, Record, RecordKey};

use super::spawn_iteration;

/// In-memory map backend. The default for ephemeral databases like the
/// live connection mirror.
pub struct MemoryStorage {
    records: DashMap<String, Record, FxBuildHasher>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            records: DashMap::with_hasher(FxBuildHasher),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageInterface for MemoryStorage {
    async fn get(&self, key: &RecordKey) -> Result<Record, CoreError> {
        match self.records.get(&key.to_string()) {
            Some(record) if record.is_valid() => Ok(record.clone()),
            _ => Err(CoreError::NotFound),
        }
    }

    async fn put(&self, mut record: Record) -> Result<Record, CoreError> {
        record.meta.touch();
        self.records.insert(record.key.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), CoreError> {
        // Shadow delete, consistent with the persistent backends; the
        // maintenance sweep removes the entry for real.
        if let Some(mut record) = self.records.get_mut(&key.to_string()) {
            record.meta.shadow_delete();
        }
        Ok(())
    }

    async fn query(
        &self,
        query: &Query,
        _allow_local: bool,
        allow_internal: bool,
    ) -> Result<QueryIterator, CoreError> {
        if !query.is_checked() {
            return Err(CoreError::InvalidQuery("query was not checked".to_string()));
        }
        let matching: Vec<Record> = self
            .records
            .iter()
            .filter(|entry| entry.value().is_valid())
            .filter(|entry| allow_internal || !entry.value().meta.secret)
            .filter_map(|entry| {
                let mut record = entry.value().clone();
                query.matches(&mut record).then_some(record)
            })
            .collect();
        Ok(spawn_iteration(matching, query))
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        self.records.clear();
        Ok(())
    }

    async fn purge(&self, query: &Query) -> Result<u64, CoreError> {
        if !query.is_checked() {
            return Err(CoreError::InvalidQuery("query was not checked".to_string()));
        }
        let before = self.records.len();
        self.records.retain(|_, record| {
            let mut candidate = record.clone();
            !query.matches(&mut candidate)
        });
        Ok((before - self.records.len()) as u64)
    }

    async fn maintain_record_states(
        &self,
        purge_deleted_before: i64,
        _shadow_delete: bool,
    ) -> Result<(), CoreError> {
        let now = Utc::now().timestamp();
        self.records.retain(|_, record| {
            let expired = record.meta.expires != 0 && record.meta.expires <= now;
            let purgeable = record.meta.is_deleted() && record.meta.deleted < purge_deleted_before;
            !expired && !purgeable
        });
        Ok(())
    }
}
