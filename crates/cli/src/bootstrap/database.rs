use std::sync::Arc;

use vigil_application::ports::StorageInterface;
use vigil_domain::Config;
use vigil_infrastructure::storage::{BackendRegistry, DelayedStorage};

/// Open the persistent record store: the sqlite backend from the
/// registry, wrapped in the delayed write-cache.
pub async fn open_storage(config: &Config) -> anyhow::Result<Arc<DelayedStorage>> {
    let registry = BackendRegistry::with_defaults();
    let backend: Arc<dyn StorageInterface> = registry
        .create(
            "sqlite",
            "core",
            &format!("sqlite://{}", config.database.path),
        )
        .await?;

    Ok(DelayedStorage::new(
        backend,
        config.database.cache_size,
        config.database.flush_threshold_percent,
    ))
}
