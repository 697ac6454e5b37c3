//! Dependency wiring: assemble the pipeline from configuration, the
//! storage stack, the policy engine and the collaborator stand-ins.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vigil_application::ports::{ProcessLookupPort, StorageInterface, VerdictSinkPort};
use vigil_application::services::{EntityEnricher, PreAuthPorts, PromptService};
use vigil_application::{DeciderChain, DnsLinkage, FilterDeps, TunnelState};
use vigil_domain::{CliOverrides, Config, PacketInfo};
use vigil_infrastructure::events::TriggerBus;
use vigil_infrastructure::filterlists::FilterListEngine;
use vigil_infrastructure::firewall::{
    ConnectionStore, FirewallHandler, HandlerDeps, InspectorRegistry, ProcessRegistry,
};
use vigil_infrastructure::reval::ReEvaluator;
use vigil_infrastructure::storage::DelayedStorage;
use vigil_jobs::{CleanerJob, JobRunner, MaintenanceJob};

use crate::bootstrap;
use crate::collaborators::{
    ConfiguredResolver, LogNotifier, LogVerdictSink, NoGeoIp, ProcSocketTables, StaticNetEnv,
};

pub struct Container {
    pub config: Config,
    pub storage: Arc<DelayedStorage>,
    pub store: Arc<ConnectionStore>,
    pub handler: Arc<FirewallHandler>,
    pub sink: Arc<dyn VerdictSinkPort>,
    pub evaluator: Arc<ReEvaluator>,
    pub triggers: TriggerBus,
    pub trigger_rx: tokio::sync::mpsc::UnboundedReceiver<vigil_infrastructure::events::Trigger>,
    pub jobs: JobRunner,
    pub shutdown: CancellationToken,
    /// Capture shim input: the platform integration feeds packets here.
    pub packet_tx: mpsc::Sender<PacketInfo>,
    pub packet_rx: mpsc::Receiver<PacketInfo>,
}

impl Container {
    pub async fn build(config: Config, overrides: CliOverrides) -> anyhow::Result<Self> {
        if !overrides.allowed_clients.is_empty() {
            tracing::info!(
                count = overrides.allowed_clients.len(),
                "API path checks bypassed for allowed client binaries"
            );
        }

        let storage = bootstrap::open_storage(&config).await?;
        let storage_dyn: Arc<dyn StorageInterface> = storage.clone();

        // Collaborators (platform integration points).
        let netenv = Arc::new(StaticNetEnv::new());
        let resolver = Arc::new(ConfiguredResolver::new(&config.server));
        let process_lookup: Arc<dyn ProcessLookupPort> = Arc::new(ProcSocketTables::new());
        let notifier = Arc::new(LogNotifier);
        let sink: Arc<dyn VerdictSinkPort> = Arc::new(LogVerdictSink);
        let geoip = Arc::new(NoGeoIp);

        // Intelligence: filter lists and the DNS reverse map.
        let filter_lists = FilterListEngine::new();
        if let Err(e) = filter_lists.load_from_storage(&storage_dyn).await {
            tracing::warn!(error = %e, "Filter list load failed, lookups stay disabled");
        }
        let linkage = Arc::new(DnsLinkage::new(Some(storage_dyn.clone())));

        // Policy engine.
        let store = Arc::new(ConnectionStore::new(netenv.clone()));
        let tunnel = Arc::new(TunnelState::default());
        let prompts = Arc::new(PromptService::new(
            notifier.clone(),
            config.filter.prompt_timeout_secs,
        ));
        let chain = DeciderChain::new(Arc::new(FilterDeps {
            config: config.filter.clone(),
            own_pid: std::process::id(),
            netenv: netenv.clone(),
            resolver: resolver.clone(),
            filter_lists: filter_lists.clone(),
            process_lookup: process_lookup.clone(),
            connections: store.clone(),
            enricher: EntityEnricher::new(geoip, filter_lists.clone()),
            prompts: prompts.clone(),
            linkage: linkage.clone(),
            tunnel: tunnel.clone(),
        }));

        let procs = Arc::new(ProcessRegistry::new());
        let handler = Arc::new(FirewallHandler::new(HandlerDeps {
            chain,
            procs: procs.clone(),
            preauth: Arc::new(PreAuthPorts::new()),
            process_lookup: process_lookup.clone(),
            resolver,
            netenv,
            sink: sink.clone(),
            linkage: linkage.clone(),
            storage: storage_dyn.clone(),
            inspectors: InspectorRegistry::new(),
            server_config: config.server.clone(),
            filter_config: config.filter.clone(),
            dns_config: config.dns.clone(),
        }));

        // Invalidation path.
        let (triggers, trigger_rx) = TriggerBus::new_enabled();
        let evaluator = ReEvaluator::new(
            store.clone(),
            procs,
            handler.clone(),
            sink.clone(),
            storage_dyn.clone(),
            process_lookup.clone(),
            prompts,
            tunnel,
        );

        // Background jobs share the daemon's shutdown token.
        let shutdown = CancellationToken::new();
        let jobs = JobRunner::new()
            .with_cleaner(
                CleanerJob::new(
                    store.clone(),
                    process_lookup,
                    storage_dyn.clone(),
                    linkage,
                    config.lifecycle.clone(),
                )
                .with_cancellation(shutdown.clone()),
            )
            .with_maintenance(
                MaintenanceJob::new(storage_dyn, config.database.purge_deleted_secs)
                    .with_cancellation(shutdown.clone()),
            );

        let (packet_tx, packet_rx) = mpsc::channel(4096);

        Ok(Self {
            config,
            storage,
            store,
            handler,
            sink,
            evaluator,
            triggers,
            trigger_rx,
            jobs,
            shutdown,
            packet_tx,
            packet_rx,
        })
    }
}
