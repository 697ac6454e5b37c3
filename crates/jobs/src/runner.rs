use crate::{CleanerJob, MaintenanceJob};
use std::sync::Arc;
use tracing::info;

/// Central orchestrator for all background jobs.
///
/// Use the builder pattern to register jobs, then call `.start()` once.
///
/// # Example
///
/// ```rust,ignore
/// JobRunner::new()
///     .with_cleaner(CleanerJob::new(store, procs, storage, linkage, cfg))
///     .with_maintenance(MaintenanceJob::new(storage, 3600))
///     .start()
///     .await;
/// ```
pub struct JobRunner {
    cleaner: Option<CleanerJob>,
    maintenance: Option<MaintenanceJob>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            cleaner: None,
            maintenance: None,
        }
    }

    pub fn with_cleaner(mut self, job: CleanerJob) -> Self {
        self.cleaner = Some(job);
        self
    }

    pub fn with_maintenance(mut self, job: MaintenanceJob) -> Self {
        self.maintenance = Some(job);
        self
    }

    /// Start all registered background jobs.
    pub async fn start(self) {
        info!("Starting background job runner");

        if let Some(job) = self.cleaner {
            Arc::new(job).start().await;
        }

        if let Some(job) = self.maintenance {
            Arc::new(job).start().await;
        }

        info!("All background jobs started");
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
