use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use vigil_domain::config::DatabaseConfig;

/// Open attempts before giving up on a busy database file.
const OPEN_RETRIES: u32 = 5;

/// Build base connection options shared by both pools.
fn base_options(database_url: &str) -> Result<SqliteConnectOptions, sqlx::Error> {
    SqliteConnectOptions::from_str(database_url).map(|o| {
        o.create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
    })
}

/// Apply per-connection PRAGMAs that improve performance for both reads
/// and writes.
async fn apply_pragmas(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA cache_size = -65536")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA temp_store = MEMORY")
        .execute(pool)
        .await?;
    Ok(())
}

/// Create the **write pool** (used by the delayed writer and maintenance).
///
/// This pool:
/// - Runs all pending migrations on startup.
/// - Sets `wal_autocheckpoint` to reduce checkpoint frequency under write
///   bursts.
/// - Uses a long `busy_timeout` to avoid `SQLITE_BUSY` errors.
/// - Is intentionally small because SQLite WAL serialises writers at the
///   file level; more connections only increase contention.
pub async fn create_write_pool(
    database_url: &str,
    cfg: &DatabaseConfig,
) -> Result<SqlitePool, sqlx::Error> {
    let options =
        base_options(database_url)?.busy_timeout(Duration::from_secs(cfg.write_busy_timeout_secs));

    let mut attempt = 0;
    let pool = loop {
        attempt += 1;
        match SqlitePoolOptions::new()
            .max_connections(cfg.write_pool_max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(cfg.write_busy_timeout_secs))
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => break pool,
            Err(e) if attempt < OPEN_RETRIES => {
                tracing::warn!(attempt, error = %e, "Database busy on open, retrying");
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    };

    apply_pragmas(&pool).await?;

    sqlx::query(&format!(
        "PRAGMA wal_autocheckpoint = {}",
        cfg.wal_autocheckpoint
    ))
    .execute(&pool)
    .await?;

    // Migrations are embedded at build time and run once, on the write
    // pool only.
    sqlx::migrate!("./migrations").run(&pool).await?;

    sqlx::query("PRAGMA optimize").execute(&pool).await?;

    Ok(pool)
}

/// Create the **read pool** (UI listings and debug dumps). SQLite WAL
/// allows multiple concurrent readers while a writer holds its lock, so a
/// dedicated pool keeps the delayed writer from starving readers.
pub async fn create_read_pool(
    database_url: &str,
    cfg: &DatabaseConfig,
) -> Result<SqlitePool, sqlx::Error> {
    let options = base_options(database_url)?.busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(cfg.read_pool_max_connections)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;

    apply_pragmas(&pool).await?;

    Ok(pool)
}

/// Single-pool convenience wrapper used by tests.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let cfg = DatabaseConfig::default();
    create_write_pool(database_url, &cfg).await
}
