use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Base directory of the filesystem-tree backend.
    #[serde(default = "default_fstree_path")]
    pub fstree_path: String,

    // ── Delayed write-cache tuning ───────────────────────────────────────────
    /// Capacity of the read cache per delay-enabled database.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Flush the write buffer once it reaches this share of the cache
    /// capacity (percent). Checked every 5 seconds.
    #[serde(default = "default_flush_threshold_percent")]
    pub flush_threshold_percent: usize,

    /// Remove shadow-deleted records after this many seconds.
    #[serde(default = "default_purge_deleted_secs")]
    pub purge_deleted_secs: i64,

    // ── Connection-pool tuning ───────────────────────────────────────────────
    /// Maximum connections in the write pool. SQLite WAL serialises writers
    /// at the file level, so more than 3–4 connections do not increase
    /// write throughput. Default: 3.
    #[serde(default = "default_write_pool_max_connections")]
    pub write_pool_max_connections: u32,

    /// Maximum connections in the read pool (UI listings, debug dumps).
    /// WAL allows concurrent readers. Default: 8.
    #[serde(default = "default_read_pool_max_connections")]
    pub read_pool_max_connections: u32,

    /// Seconds the write pool will wait for a database lock before
    /// returning `SQLITE_BUSY`. Default: 30.
    #[serde(default = "default_write_busy_timeout_secs")]
    pub write_busy_timeout_secs: u64,

    /// Number of WAL pages that trigger an automatic checkpoint.
    /// Default: 10 000.
    #[serde(default = "default_wal_autocheckpoint")]
    pub wal_autocheckpoint: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            fstree_path: default_fstree_path(),
            cache_size: default_cache_size(),
            flush_threshold_percent: default_flush_threshold_percent(),
            purge_deleted_secs: default_purge_deleted_secs(),
            write_pool_max_connections: default_write_pool_max_connections(),
            read_pool_max_connections: default_read_pool_max_connections(),
            write_busy_timeout_secs: default_write_busy_timeout_secs(),
            wal_autocheckpoint: default_wal_autocheckpoint(),
        }
    }
}

fn default_db_path() -> String {
    "./vigil.db".to_string()
}

fn default_fstree_path() -> String {
    "./data".to_string()
}

fn default_cache_size() -> usize {
    1024
}

fn default_flush_threshold_percent() -> usize {
    25
}

fn default_purge_deleted_secs() -> i64 {
    3600
}

fn default_write_pool_max_connections() -> u32 {
    3
}

fn default_read_pool_max_connections() -> u32 {
    8
}

fn default_write_busy_timeout_secs() -> u64 {
    30
}

fn default_wal_autocheckpoint() -> u32 {
    10_000
}
