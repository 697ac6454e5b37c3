use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vigil_application::ports::{ProcessLookupPort, StorageInterface};
use vigil_application::DnsLinkage;
use vigil_domain::config::LifecycleConfig;
use vigil_domain::{ConnectionKind, Record};
use vigil_infrastructure::firewall::ConnectionStore;

/// Periodic connection cleaner.
///
/// Marks connections ended once the OS state table no longer reports
/// them, persists the final state, and deletes them from the live tables
/// after a grace period. DNS request records linger longer so late IP
/// connections can still be attributed.
pub struct CleanerJob {
    store: Arc<ConnectionStore>,
    process_lookup: Arc<dyn ProcessLookupPort>,
    storage: Arc<dyn StorageInterface>,
    linkage: Arc<DnsLinkage>,
    config: LifecycleConfig,
    shutdown: CancellationToken,
}

impl CleanerJob {
    pub fn new(
        store: Arc<ConnectionStore>,
        process_lookup: Arc<dyn ProcessLookupPort>,
        storage: Arc<dyn StorageInterface>,
        linkage: Arc<DnsLinkage>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            process_lookup,
            storage,
            linkage,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.config.cleaner_interval_secs,
            "Starting connection cleaner job"
        );

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.cleaner_interval_secs));
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        info!("CleanerJob: shutting down");
                        break;
                    }
                    _ = interval.tick() => {
                        self.clean_cycle().await;
                    }
                }
            }
        });
    }

    /// One cleaning pass. Public so tests can drive it directly.
    pub async fn clean_cycle(&self) {
        let os_active: HashSet<String> =
            self.process_lookup.active_connection_ids().await.into_iter().collect();
        let now = Utc::now().timestamp();

        let mut ended = 0usize;
        let mut removed = 0usize;

        for shared in self.store.list() {
            let mut conn = shared.lock().await;

            if !conn.has_ended() {
                let gone = match conn.kind {
                    ConnectionKind::Ip => !os_active.contains(&conn.id),
                    // DNS requests are one-shot; they end as soon as the
                    // cleaner sees them.
                    ConnectionKind::DnsRequest => true,
                };
                if gone {
                    conn.set_ended(Some("no longer reported by the OS".to_string()));
                    ended += 1;
                    self.persist(&conn).await;
                }
                continue;
            }

            let grace = match conn.kind {
                ConnectionKind::Ip => self.config.ended_grace_secs,
                ConnectionKind::DnsRequest => self.config.dns_request_grace_secs,
            };
            if conn.ended + grace <= now {
                let kind = conn.kind;
                let id = conn.id.clone();
                drop(conn);
                self.store.delete(kind, &id);
                removed += 1;
            }
        }

        self.linkage.cleanup();

        if ended > 0 || removed > 0 {
            debug!(ended, removed, active = self.store.len(), "Cleaner pass completed");
        }
    }

    async fn persist(&self, conn: &vigil_domain::Connection) {
        let key = conn.record_key();
        let key = key.trim_start_matches("network:");
        if let Ok(record) = Record::from_value("network", key, conn) {
            let _ = self.storage.put(record).await;
        }
    }
}
