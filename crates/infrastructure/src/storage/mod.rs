//! Pluggable record storage: backend factory registry, the backends
//! themselves, and the delayed write-cache layered above them.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

use vigil_application::ports::StorageInterface;
use vigil_domain::CoreError;

mod btree;
mod cache;
mod fstree;
mod iterate;
mod memory;
mod sinkhole;
mod sqlite;

pub use btree::BTreeStorage;
pub use cache::DelayedStorage;
pub use fstree::FsTreeStorage;
pub use memory::MemoryStorage;
pub use sinkhole::SinkholeStorage;
pub use sqlite::SqliteStorage;

pub(crate) use iterate::spawn_iteration;

/// Constructor of one backend: `(database name, location) → storage`.
pub type BackendFactory = Arc<
    dyn Fn(String, String) -> BoxFuture<'static, Result<Arc<dyn StorageInterface>, CoreError>>
        + Send
        + Sync,
>;

/// Registry of storage backend factories, owned by the composition root
/// and passed down so tests can build isolated registries.
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in backends registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", |_name, _location| {
            Box::pin(async { Ok(Arc::new(MemoryStorage::new()) as Arc<dyn StorageInterface>) })
        });
        registry.register("sinkhole", |_name, _location| {
            Box::pin(async { Ok(Arc::new(SinkholeStorage) as Arc<dyn StorageInterface>) })
        });
        registry.register("fstree", |_name, location| {
            Box::pin(async move {
                let storage = FsTreeStorage::open(&location).await?;
                Ok(Arc::new(storage) as Arc<dyn StorageInterface>)
            })
        });
        registry.register("btree", |_name, location| {
            Box::pin(async move {
                let storage = BTreeStorage::open(&location).await?;
                Ok(Arc::new(storage) as Arc<dyn StorageInterface>)
            })
        });
        registry.register("sqlite", |_name, location| {
            Box::pin(async move {
                let pool = crate::database::create_pool(&location)
                    .await
                    .map_err(|e| CoreError::Database(e.to_string()))?;
                Ok(Arc::new(SqliteStorage::new(pool)) as Arc<dyn StorageInterface>)
            })
        });
        registry
    }

    pub fn register<F>(&mut self, backend: &str, factory: F)
    where
        F: Fn(String, String) -> BoxFuture<'static, Result<Arc<dyn StorageInterface>, CoreError>>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(backend.to_string(), Arc::new(factory));
    }

    /// Instantiate a backend by name. An unknown backend is fatal to the
    /// operation.
    pub async fn create(
        &self,
        backend: &str,
        name: &str,
        location: &str,
    ) -> Result<Arc<dyn StorageInterface>, CoreError> {
        let factory = self
            .factories
            .get(backend)
            .ok_or_else(|| CoreError::UnknownBackend(backend.to_string()))?;
        factory(name.to_string(), location.to_string()).await
    }

    pub fn backends(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
