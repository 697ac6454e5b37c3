use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use vigil_application::ports::StorageInterface;

/// Thorough maintenance runs every Nth regular pass.
const THOROUGH_EVERY: u32 = 24;

/// Periodic storage maintenance: expiry sweeps, shadow-delete purging and
/// backend-specific upkeep.
pub struct MaintenanceJob {
    storage: Arc<dyn StorageInterface>,
    purge_deleted_secs: i64,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl MaintenanceJob {
    pub fn new(storage: Arc<dyn StorageInterface>, purge_deleted_secs: i64) -> Self {
        Self {
            storage,
            purge_deleted_secs,
            interval_secs: 3600,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.interval_secs,
            "Starting storage maintenance job"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
            let mut passes: u32 = 0;
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("MaintenanceJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        passes += 1;
                        self.maintenance_cycle(passes % THOROUGH_EVERY == 0).await;
                    }
                }
            }
        });
    }

    /// One maintenance pass. Public so tests can drive it directly.
    pub async fn maintenance_cycle(&self, thorough: bool) {
        let purge_before = Utc::now().timestamp() - self.purge_deleted_secs;
        if let Err(e) = self
            .storage
            .maintain_record_states(purge_before, true)
            .await
        {
            error!(error = %e, "Record state maintenance failed");
        }

        let result = if thorough {
            self.storage.maintain_thorough().await
        } else {
            self.storage.maintain().await
        };
        match result {
            Ok(()) => info!(thorough, "Storage maintenance completed"),
            Err(e) => error!(error = %e, "Storage maintenance failed"),
        }
    }
}
