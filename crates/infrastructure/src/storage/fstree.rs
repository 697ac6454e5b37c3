use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

use vigil_application::ports::{QueryIterator, StorageInterface};
use vigil_domain::{CoreError, Query, Record, RecordKey};

use super::spawn_iteration;

const FILE_SUFFIX: &str = ".json";

/// Filesystem-tree backend: one JSON file per record, directories per key
/// segment. Slow but transparent; meant for debugging and small databases.
pub struct FsTreeStorage {
    base: PathBuf,
}

impl FsTreeStorage {
    pub async fn open(location: &str) -> Result<Self, CoreError> {
        let base = PathBuf::from(location);
        tokio::fs::create_dir_all(&base).await?;
        Ok(Self {
            base: base.canonicalize().map_err(CoreError::from)?,
        })
    }

    /// Resolve a key to a file path, rejecting anything that would escape
    /// the base directory.
    fn path_for(&self, key: &RecordKey) -> Result<PathBuf, CoreError> {
        let relative = PathBuf::from(&key.db).join(&key.key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CoreError::PathViolation(key.to_string()));
        }
        let mut path = self.base.join(relative);
        let mut name = path
            .file_name()
            .ok_or_else(|| CoreError::PathViolation(key.to_string()))?
            .to_os_string();
        name.push(FILE_SUFFIX);
        path.set_file_name(name);
        Ok(path)
    }

    async fn read_record(path: &Path) -> Result<Record, CoreError> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::Storage(e.to_string()))
    }

    /// Recursively collect all records below `dir`.
    async fn collect(&self, dir: PathBuf, out: &mut Vec<Record>) -> Result<(), CoreError> {
        let mut stack = vec![dir];
        while let Some(current) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().is_some_and(|e| e == "json") {
                    match Self::read_record(&path).await {
                        Ok(record) => out.push(record),
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable record file")
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageInterface for FsTreeStorage {
    async fn get(&self, key: &RecordKey) -> Result<Record, CoreError> {
        let path = self.path_for(key)?;
        let record = Self::read_record(&path).await?;
        if !record.is_valid() {
            return Err(CoreError::NotFound);
        }
        Ok(record)
    }

    async fn put(&self, mut record: Record) -> Result<Record, CoreError> {
        record.meta.touch();
        let path = self.path_for(&record.key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes =
            serde_json::to_vec_pretty(&record).map_err(|e| CoreError::Storage(e.to_string()))?;

        // Write-then-rename keeps readers from observing partial files.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(record)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), CoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
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
        let mut all = Vec::new();
        self.collect(self.base.join(&query.db_name), &mut all).await?;
        let matching: Vec<Record> = all
            .into_iter()
            .filter(|r| r.is_valid())
            .filter(|r| allow_internal || !r.meta.secret)
            .filter_map(|mut r| query.matches(&mut r).then_some(r))
            .collect();
        Ok(spawn_iteration(matching, query))
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        Ok(())
    }
}
