use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use vigil_application::ports::{QueryIterator, StorageInterface};
use vigil_domain::{CoreError, Query, Record, RecordKey};

use super::spawn_iteration;

/// One line of the append-only log.
#[derive(Serialize, Deserialize)]
enum LogEntry {
    Put(Record),
    Delete(String),
}

/// Embedded ordered-map backend persisted to a single append-only log
/// file. The full tree is held in memory; `maintain_thorough` rewrites
/// the log to drop superseded entries.
///
/// A corrupt tail (torn write on crash) is truncated once with a warning;
/// everything before it is recovered.
pub struct BTreeStorage {
    path: PathBuf,
    inner: Mutex<BTreeInner>,
}

struct BTreeInner {
    tree: BTreeMap<String, Record>,
    log: tokio::fs::File,
}

impl BTreeStorage {
    pub async fn open(location: &str) -> Result<Self, CoreError> {
        let path = PathBuf::from(location);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tree = BTreeMap::new();
        let mut valid_len: u64 = 0;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mut corrupt = false;
                for line in bytes.split(|b| *b == b'\n') {
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<LogEntry>(line) {
                        Ok(LogEntry::Put(record)) => {
                            valid_len += line.len() as u64 + 1;
                            tree.insert(record.key.to_string(), record);
                        }
                        Ok(LogEntry::Delete(key)) => {
                            valid_len += line.len() as u64 + 1;
                            tree.remove(&key);
                        }
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "Corrupt log tail, truncating to last valid entry"
                            );
                            corrupt = true;
                            break;
                        }
                    }
                }
                if corrupt {
                    let file = std::fs::OpenOptions::new()
                        .write(true)
                        .open(&path)
                        .map_err(CoreError::from)?;
                    file.set_len(valid_len).map_err(CoreError::from)?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            inner: Mutex::new(BTreeInner { tree, log }),
        })
    }

    async fn append(inner: &mut BTreeInner, entry: &LogEntry) -> Result<(), CoreError> {
        let mut line = serde_json::to_vec(entry).map_err(|e| CoreError::Storage(e.to_string()))?;
        line.push(b'\n');
        inner.log.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageInterface for BTreeStorage {
    async fn get(&self, key: &RecordKey) -> Result<Record, CoreError> {
        let inner = self.inner.lock().await;
        match inner.tree.get(&key.to_string()) {
            Some(record) if record.is_valid() => Ok(record.clone()),
            _ => Err(CoreError::NotFound),
        }
    }

    async fn put(&self, mut record: Record) -> Result<Record, CoreError> {
        record.meta.touch();
        let mut inner = self.inner.lock().await;
        Self::append(&mut inner, &LogEntry::Put(record.clone())).await?;
        inner.tree.insert(record.key.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        Self::append(&mut inner, &LogEntry::Delete(key.to_string())).await?;
        inner.tree.remove(&key.to_string());
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
        // The tree is ordered by full key, so a prefix range bounds the
        // scan.
        let prefix = format!("{}:{}", query.db_name, query.db_key_prefix);
        let inner = self.inner.lock().await;
        let matching: Vec<Record> = inner
            .tree
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(_, record)| record.clone())
            .filter(|r| r.is_valid())
            .filter(|r| allow_internal || !r.meta.secret)
            .filter_map(|mut r| query.matches(&mut r).then_some(r))
            .collect();
        Ok(spawn_iteration(matching, query))
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner.log.flush().await?;
        Ok(())
    }

    /// Rewrite the log so it contains exactly the live tree.
    async fn maintain_thorough(&self) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;

        let tmp = self.path.with_extension("compact");
        let mut out = tokio::fs::File::create(&tmp).await?;
        for record in inner.tree.values() {
            let mut line = serde_json::to_vec(&LogEntry::Put(record.clone()))
                .map_err(|e| CoreError::Storage(e.to_string()))?;
            line.push(b'\n');
            out.write_all(&line).await?;
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&tmp, &self.path).await?;

        inner.log = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await?;
        Ok(())
    }

    async fn maintain_record_states(
        &self,
        purge_deleted_before: i64,
        _shadow_delete: bool,
    ) -> Result<(), CoreError> {
        let now = chrono::Utc::now().timestamp();
        let mut inner = self.inner.lock().await;
        inner.tree.retain(|_, record| {
            let expired = record.meta.expires != 0 && record.meta.expires <= now;
            let purgeable = record.meta.is_deleted() && record.meta.deleted < purge_deleted_before;
            !expired && !purgeable
        });
        Ok(())
    }
}
