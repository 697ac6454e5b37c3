//! Re-evaluation & invalidation: on configuration, profile, tunnel or
//! attribution changes, re-run the decider for affected live connections
//! and push changed verdicts to the OS integration.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vigil_application::ports::{ProcessLookupPort, StorageInterface, VerdictSinkPort};
use vigil_application::services::PromptService;
use vigil_application::TunnelState;
use vigil_domain::Record;

use crate::events::Trigger;
use crate::firewall::{ConnectionStore, FirewallHandler, ProcessRegistry};

pub struct ReEvaluator {
    store: Arc<ConnectionStore>,
    procs: Arc<ProcessRegistry>,
    handler: Arc<FirewallHandler>,
    sink: Arc<dyn VerdictSinkPort>,
    storage: Arc<dyn StorageInterface>,
    process_lookup: Arc<dyn ProcessLookupPort>,
    prompts: Arc<PromptService>,
    tunnel: Arc<TunnelState>,
    /// Serialises re-evaluations so simultaneous triggers do not race
    /// re-attribution.
    reattribution: Mutex<()>,
}

impl ReEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ConnectionStore>,
        procs: Arc<ProcessRegistry>,
        handler: Arc<FirewallHandler>,
        sink: Arc<dyn VerdictSinkPort>,
        storage: Arc<dyn StorageInterface>,
        process_lookup: Arc<dyn ProcessLookupPort>,
        prompts: Arc<PromptService>,
        tunnel: Arc<TunnelState>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            procs,
            handler,
            sink,
            storage,
            process_lookup,
            prompts,
            tunnel,
            reattribution: Mutex::new(()),
        })
    }

    /// Single worker consuming the trigger bus.
    pub fn spawn(
        self: &Arc<Self>,
        mut triggers: mpsc::UnboundedReceiver<Trigger>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            info!("Re-evaluation worker started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Re-evaluation worker stopped");
                        return;
                    }
                    maybe_trigger = triggers.recv() => {
                        let Some(trigger) = maybe_trigger else { return };
                        this.handle_trigger(trigger).await;
                    }
                }
            }
        })
    }

    async fn handle_trigger(&self, trigger: Trigger) {
        debug!(?trigger, "Handling invalidation trigger");
        match &trigger {
            Trigger::ConfigChange | Trigger::AccountUpdate => {
                self.procs.mark_profiles_outdated(None);
                self.reevaluate(None).await;
            }
            Trigger::ProfileChange { scope } => {
                self.procs.mark_profiles_outdated(Some(scope));
                self.reevaluate(Some(scope.clone())).await;
            }
            Trigger::TunnelConnected => {
                self.tunnel.set_connected(true);
                self.reevaluate(None).await;
            }
            Trigger::ReAttribution { conn_id } => {
                self.reevaluate_one(conn_id).await;
            }
        }
    }

    /// Walk the live tables in snapshot order and re-run the decider for
    /// each eligible connection.
    pub async fn reevaluate(&self, scope: Option<String>) {
        let _guard = self.reattribution.lock().await;

        let mut checked = 0usize;
        let mut changed = 0usize;
        for shared in self.store.list() {
            let mut conn = shared.lock().await;
            if conn.has_ended() || conn.internal {
                continue;
            }
            if let Some(scope) = &scope {
                if conn.profile_scope().as_deref() != Some(scope.as_str()) {
                    continue;
                }
            }

            // A pending prompt for the old state is moot now.
            if conn.prompt_id.is_some() {
                self.prompts.cancel_for(&conn).await;
                conn.prompt_id = None;
            }

            checked += 1;
            if self.handler.filter_connection(&mut conn).await {
                changed += 1;
                self.sink.update_connection(&conn);
                self.persist(&conn).await;
            }
        }
        info!(checked, changed, "Re-evaluation completed");
    }

    async fn reevaluate_one(&self, conn_id: &str) {
        let _guard = self.reattribution.lock().await;
        let Some(shared) = self.store.get(conn_id) else {
            return;
        };
        let mut conn = shared.lock().await;
        if conn.has_ended() || conn.internal {
            return;
        }
        // Re-attribution: refresh the process snapshot and its profile,
        // then re-run the chain against fresh list data.
        if let Some(pid) = conn.pid() {
            if let Ok(process) = self.process_lookup.process(pid).await {
                conn.process_ctx = Some(process.context());
                self.procs.insert(process);
            }
        }
        conn.entity.reset_lists();
        if self.handler.filter_connection(&mut conn).await {
            self.sink.update_connection(&conn);
            self.persist(&conn).await;
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
