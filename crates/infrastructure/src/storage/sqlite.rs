use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use vigil_application::ports::{BatchSink, QueryIterator, StorageInterface};
use vigil_domain::record::FORMAT_JSON;
use vigil_domain::{CoreError, Query, Record, RecordKey, RecordMeta};

use super::spawn_iteration;

const BATCH_CHANNEL_CAPACITY: usize = 10_000;
const MAX_BATCH_SIZE: usize = 500;
const FLUSH_INTERVAL_MS: u64 = 100;

/// SQL-on-disk backend over the single `records` table.
///
/// `delete` is a shadow delete: the row stays with a `deleted` timestamp
/// so the UI can show recently-removed records until a purge pass.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<Record, CoreError> {
        let key_str: String = row.get("key");
        let key = RecordKey::parse(&key_str)?;
        let value: Vec<u8> = row.get("value");
        let body =
            serde_json::from_slice(&value).map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(Record {
            key,
            meta: RecordMeta {
                created: row.get("created"),
                modified: row.get("modified"),
                expires: row.get("expires"),
                deleted: row.get("deleted"),
                secret: row.get("secret"),
                crownjewel: row.get("crownjewel"),
            },
            format: row.get::<i64, _>("format") as u8,
            body,
        })
    }

    async fn write_record(pool: &SqlitePool, record: &Record) -> Result<(), CoreError> {
        let value =
            serde_json::to_vec(&record.body).map_err(|e| CoreError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT INTO records (key, format, value, created, modified, expires, deleted, secret, crownjewel)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                format = excluded.format,
                value = excluded.value,
                modified = excluded.modified,
                expires = excluded.expires,
                deleted = excluded.deleted,
                secret = excluded.secret,
                crownjewel = excluded.crownjewel",
        )
        .bind(record.key.to_string())
        .bind(i64::from(record.format))
        .bind(value)
        .bind(record.meta.created)
        .bind(record.meta.modified)
        .bind(record.meta.expires)
        .bind(record.meta.deleted)
        .bind(record.meta.secret)
        .bind(record.meta.crownjewel)
        .execute(pool)
        .await
        .map_err(|e| CoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn flush_batch(pool: &SqlitePool, batch: &mut Vec<Record>) -> Result<(), CoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        for record in batch.iter() {
            let value =
                serde_json::to_vec(&record.body).map_err(|e| CoreError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO records (key, format, value, created, modified, expires, deleted, secret, crownjewel)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET
                    format = excluded.format,
                    value = excluded.value,
                    modified = excluded.modified,
                    expires = excluded.expires,
                    deleted = excluded.deleted,
                    secret = excluded.secret,
                    crownjewel = excluded.crownjewel",
            )
            .bind(record.key.to_string())
            .bind(i64::from(record.format))
            .bind(value)
            .bind(record.meta.created)
            .bind(record.meta.modified)
            .bind(record.meta.expires)
            .bind(record.meta.deleted)
            .bind(record.meta.secret)
            .bind(record.meta.crownjewel)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        debug!(count = batch.len(), "Record batch flushed");
        batch.clear();
        Ok(())
    }

    async fn batch_loop(
        pool: SqlitePool,
        mut receiver: mpsc::Receiver<Record>,
        result: oneshot::Sender<Result<(), CoreError>>,
    ) {
        let mut batch: Vec<Record> = Vec::with_capacity(MAX_BATCH_SIZE);
        let mut flush_interval =
            tokio::time::interval(Duration::from_millis(FLUSH_INTERVAL_MS));
        let mut outcome: Result<(), CoreError> = Ok(());

        loop {
            tokio::select! {
                maybe_record = receiver.recv() => {
                    match maybe_record {
                        Some(mut record) => {
                            record.meta.touch();
                            batch.push(record);
                            while batch.len() < MAX_BATCH_SIZE {
                                match receiver.try_recv() {
                                    Ok(mut r) => {
                                        r.meta.touch();
                                        batch.push(r);
                                    }
                                    Err(_) => break,
                                }
                            }
                            if batch.len() >= MAX_BATCH_SIZE {
                                if let Err(e) = Self::flush_batch(&pool, &mut batch).await {
                                    error!(error = %e, "Batch flush failed");
                                    outcome = Err(e);
                                }
                            }
                        }
                        None => {
                            if let Err(e) = Self::flush_batch(&pool, &mut batch).await {
                                error!(error = %e, "Final batch flush failed");
                                outcome = Err(e);
                            }
                            let _ = result.send(outcome);
                            return;
                        }
                    }
                }
                _ = flush_interval.tick() => {
                    if let Err(e) = Self::flush_batch(&pool, &mut batch).await {
                        error!(error = %e, "Periodic batch flush failed");
                        outcome = Err(e);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StorageInterface for SqliteStorage {
    async fn get(&self, key: &RecordKey) -> Result<Record, CoreError> {
        let row = sqlx::query("SELECT * FROM records WHERE key = ?")
            .bind(key.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;

        let row = row.ok_or(CoreError::NotFound)?;
        let record = Self::row_to_record(&row)?;
        if !record.is_valid() {
            return Err(CoreError::NotFound);
        }
        Ok(record)
    }

    async fn put(&self, mut record: Record) -> Result<Record, CoreError> {
        record.meta.touch();
        Self::write_record(&self.pool, &record).await?;
        Ok(record)
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), CoreError> {
        sqlx::query("UPDATE records SET deleted = ? WHERE key = ?")
            .bind(Utc::now().timestamp())
            .bind(key.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
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

        let prefix = format!("{}:{}", query.db_name, query.db_key_prefix);
        let rows = sqlx::query("SELECT * FROM records WHERE key >= ? AND key < ? AND deleted = 0")
            .bind(prefix.clone())
            .bind(prefix_upper_bound(&prefix))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;

        let mut matching = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Self::row_to_record(row)?;
            if !record.is_valid() {
                continue;
            }
            if !allow_internal && record.meta.secret {
                continue;
            }
            if query.matches(&mut record) {
                matching.push(record);
            }
        }
        Ok(spawn_iteration(matching, query))
    }

    async fn shutdown(&self) -> Result<(), CoreError> {
        self.pool.close().await;
        Ok(())
    }

    async fn put_many(&self) -> Result<BatchSink, CoreError> {
        let (tx, rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (result_tx, result_rx) = oneshot::channel();
        let pool = self.pool.clone();
        tokio::spawn(async move {
            Self::batch_loop(pool, rx, result_tx).await;
        });
        Ok(BatchSink {
            input: tx,
            errors: result_rx,
        })
    }

    async fn purge(&self, query: &Query) -> Result<u64, CoreError> {
        if !query.is_checked() {
            return Err(CoreError::InvalidQuery("query was not checked".to_string()));
        }

        // Condition evaluation happens in Rust, so select candidates by
        // prefix first and delete the matching keys in one statement.
        let mut iterator = self.query(query, true, true).await?;
        let mut keys = Vec::new();
        while let Some(record) = iterator.next().await {
            keys.push(record.key.to_string());
        }
        let count = keys.len() as u64;

        for chunk in keys.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM records WHERE key IN ({placeholders})");
            let mut q = sqlx::query(&sql);
            for key in chunk {
                q = q.bind(key);
            }
            q.execute(&self.pool)
                .await
                .map_err(|e| CoreError::Database(e.to_string()))?;
        }

        info!(count, "Purged records");
        Ok(count)
    }

    async fn maintain(&self) -> Result<(), CoreError> {
        sqlx::query("PRAGMA optimize")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn maintain_thorough(&self) -> Result<(), CoreError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn maintain_record_states(
        &self,
        purge_deleted_before: i64,
        shadow_delete: bool,
    ) -> Result<(), CoreError> {
        let now = Utc::now().timestamp();

        // Expired records are deleted, as a shadow delete when requested.
        if shadow_delete {
            sqlx::query(
                "UPDATE records SET deleted = ? WHERE deleted = 0 AND expires != 0 AND expires <= ?",
            )
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Database(e.to_string()))?;
        } else {
            sqlx::query("DELETE FROM records WHERE expires != 0 AND expires <= ?")
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::Database(e.to_string()))?;
        }

        // Shadow-deleted records past the threshold are purged for real.
        let purged =
            sqlx::query("DELETE FROM records WHERE deleted != 0 AND deleted < ?")
                .bind(purge_deleted_before)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::Database(e.to_string()))?;
        if purged.rows_affected() > 0 {
            debug!(count = purged.rows_affected(), "Purged shadow-deleted records");
        }
        Ok(())
    }
}

/// Smallest string greater than every key with the given prefix.
fn prefix_upper_bound(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.last_mut() {
        if *last < 0xff {
            *last += 1;
            return String::from_utf8_lossy(&bytes).into_owned();
        }
        bytes.pop();
    }
    // All 0xff: no upper bound, scan to the end.
    "\u{10FFFF}".to_string()
}
