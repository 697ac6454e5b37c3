#![allow(dead_code)]

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, RwLock};

use vigil_application::ports::{
    FilterListPort, GeoIpPort, Location, NetEnvPort, NotifierPort, ProcessLookupPort, Prompt,
    ResolverPort, VerdictSinkPort,
};
use vigil_application::services::{EntityEnricher, PreAuthPorts, PromptService};
use vigil_application::{DeciderChain, DnsLinkage, FilterDeps, TunnelState};
use vigil_domain::config::{DnsConfig, FilterConfig, ServerConfig};
use vigil_domain::{
    Connection, CoreError, LayeredProfile, OnlineStatus, PacketAction, PacketInfo, Process,
    Profile, ProfileSettings, ResolverInfo, ResolverScope,
};

use vigil_infrastructure::firewall::{
    ConnectionStore, FirewallHandler, HandlerDeps, InspectorRegistry, ProcessRegistry,
};
use vigil_infrastructure::storage::MemoryStorage;

pub const OWN_PID: u32 = 4242;
pub const SYSTEM_RESOLVER_PID: u32 = 153;

pub struct MockNetEnv {
    pub ips: Vec<IpAddr>,
    pub networks: Vec<IpNetwork>,
}

impl MockNetEnv {
    pub fn new() -> Self {
        Self {
            ips: vec!["10.0.0.2".parse().unwrap(), "127.0.0.1".parse().unwrap()],
            networks: vec!["10.0.0.0/24".parse().unwrap()],
        }
    }
}

impl NetEnvPort for MockNetEnv {
    fn online_status(&self) -> OnlineStatus {
        OnlineStatus::Online
    }

    fn local_ips(&self) -> Vec<IpAddr> {
        self.ips.clone()
    }

    fn local_networks(&self) -> Vec<IpNetwork> {
        self.networks.clone()
    }
}

pub struct MockResolver {
    pub disabled: RwLock<bool>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            disabled: RwLock::new(false),
        }
    }

    pub fn set_disabled(&self, disabled: bool) {
        *self.disabled.write().unwrap() = disabled;
    }
}

impl ResolverPort for MockResolver {
    fn is_disabled(&self) -> bool {
        *self.disabled.read().unwrap()
    }

    fn nameserver_ips(&self) -> Vec<IpAddr> {
        vec!["127.0.0.53".parse().unwrap()]
    }

    fn resolver_info(&self) -> ResolverInfo {
        ResolverInfo {
            name: "local".to_string(),
            kind: "plain".to_string(),
            source: "config".to_string(),
            ip: Some("127.0.0.53".parse().unwrap()),
            scope: ResolverScope::Localhost,
        }
    }
}

#[derive(Default)]
pub struct MockFilterLists {
    pub domains: RwLock<HashMap<String, Vec<String>>>,
}

impl MockFilterLists {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilterListPort for MockFilterLists {
    fn ready(&self) -> bool {
        true
    }

    async fn lookup_domain(&self, domain: &str) -> Result<Vec<String>, CoreError> {
        Ok(self
            .domains
            .read()
            .unwrap()
            .get(domain)
            .cloned()
            .unwrap_or_default())
    }

    async fn lookup_ip(&self, _ip: IpAddr) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }

    async fn lookup_asn(&self, _asn: u32) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }

    async fn lookup_country(&self, _country: &str) -> Result<Vec<String>, CoreError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MockGeoIp;

#[async_trait]
impl GeoIpPort for MockGeoIp {
    async fn location(&self, _ip: IpAddr) -> Result<Option<Location>, CoreError> {
        Ok(None)
    }
}

pub struct MockProcessLookup {
    pub processes: RwLock<HashMap<u32, Process>>,
    pub active_ids: RwLock<Vec<String>>,
}

impl MockProcessLookup {
    pub fn new() -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
            active_ids: RwLock::new(Vec::new()),
        }
    }

    pub fn add_process(&self, process: Process) {
        self.processes.write().unwrap().insert(process.pid, process);
    }
}

#[async_trait]
impl ProcessLookupPort for MockProcessLookup {
    async fn pid_of_connection(&self, packet: &PacketInfo) -> Result<Option<u32>, CoreError> {
        Ok(packet.pid)
    }

    async fn process(&self, pid: u32) -> Result<Process, CoreError> {
        self.processes
            .read()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    fn is_system_resolver(&self, pid: u32) -> bool {
        pid == SYSTEM_RESOLVER_PID
    }

    async fn active_connection_ids(&self) -> Vec<String> {
        self.active_ids.read().unwrap().clone()
    }
}

pub struct MockNotifier;

#[async_trait]
impl NotifierPort for MockNotifier {
    async fn prompt(&self, _prompt: Prompt) -> Option<String> {
        None
    }

    async fn cancel(&self, _event_id: &str) {}
}

/// Records every action handed to the capture layer.
#[derive(Default)]
pub struct RecordingSink {
    pub actions: Mutex<Vec<(String, PacketAction)>>,
    pub updates: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_action(&self) -> Option<PacketAction> {
        self.actions.lock().unwrap().last().map(|(_, a)| *a)
    }
}

impl VerdictSinkPort for RecordingSink {
    fn issue(&self, packet: &PacketInfo, action: PacketAction) {
        self.actions
            .lock()
            .unwrap()
            .push((packet.connection_id(), action));
    }

    fn update_connection(&self, conn: &Connection) {
        self.updates.lock().unwrap().push(conn.id.clone());
    }
}

// ============================================================================
// Assembly
// ============================================================================

pub struct PipelineEnv {
    pub store: Arc<ConnectionStore>,
    pub procs: Arc<ProcessRegistry>,
    pub handler: Arc<FirewallHandler>,
    pub sink: Arc<RecordingSink>,
    pub storage: Arc<MemoryStorage>,
    pub preauth: Arc<PreAuthPorts>,
    pub process_lookup: Arc<MockProcessLookup>,
    pub resolver: Arc<MockResolver>,
    pub lists: Arc<MockFilterLists>,
    pub linkage: Arc<DnsLinkage>,
    pub tunnel: Arc<TunnelState>,
    pub prompts: Arc<PromptService>,
}

impl PipelineEnv {
    pub fn new() -> Self {
        let netenv = Arc::new(MockNetEnv::new());
        let resolver = Arc::new(MockResolver::new());
        let lists = Arc::new(MockFilterLists::new());
        let process_lookup = Arc::new(MockProcessLookup::new());
        let store = Arc::new(ConnectionStore::new(netenv.clone()));
        let linkage = Arc::new(DnsLinkage::new(None));
        let tunnel = Arc::new(TunnelState::default());
        let storage = Arc::new(MemoryStorage::new());
        let preauth = Arc::new(PreAuthPorts::new());
        let prompts = Arc::new(PromptService::new(Arc::new(MockNotifier), 1));
        let sink = Arc::new(RecordingSink::new());

        let deps = FilterDeps {
            config: FilterConfig::default(),
            own_pid: OWN_PID,
            netenv: netenv.clone(),
            resolver: resolver.clone(),
            filter_lists: lists.clone(),
            process_lookup: process_lookup.clone(),
            connections: store.clone(),
            enricher: EntityEnricher::new(Arc::new(MockGeoIp), lists.clone()),
            prompts: prompts.clone(),
            linkage: linkage.clone(),
            tunnel: tunnel.clone(),
        };
        let chain = DeciderChain::new(Arc::new(deps));

        let procs = Arc::new(ProcessRegistry::new());
        let handler = Arc::new(FirewallHandler::new(HandlerDeps {
            chain,
            procs: procs.clone(),
            preauth: preauth.clone(),
            process_lookup: process_lookup.clone(),
            resolver: resolver.clone(),
            netenv,
            sink: sink.clone(),
            linkage: linkage.clone(),
            storage: storage.clone(),
            inspectors: InspectorRegistry::new(),
            server_config: ServerConfig::default(),
            filter_config: FilterConfig::default(),
            dns_config: DnsConfig::default(),
        }));

        Self {
            store,
            procs,
            handler,
            sink,
            storage,
            preauth,
            process_lookup,
            resolver,
            lists,
            linkage,
            tunnel,
            prompts,
        }
    }

    /// Deliver one packet the way the dispatcher does.
    pub async fn deliver(&self, pkt: &PacketInfo) {
        let conn = match self.store.get(&pkt.connection_id()) {
            Some(conn) => conn,
            None => self.store.add(Connection::from_packet(pkt)),
        };
        let mut guard = conn.lock().await;
        self.handler.handle_packet(&mut guard, pkt).await;
    }
}

pub fn layered_profile(local: ProfileSettings, global: ProfileSettings) -> Arc<LayeredProfile> {
    let local = Arc::new(Profile::new("local", "app-profile", "App").with_settings(local));
    let global = Arc::new(Profile::new("special", "global-config", "Global").with_settings(global));
    Arc::new(LayeredProfile::new(local, global))
}

pub fn make_process(pid: u32, path: &str, name: &str, profile: Arc<LayeredProfile>) -> Process {
    let exec = path.rsplit('/').next().unwrap_or(name).to_string();
    Process::new(pid, path, name, exec, 1, format!("{path} --run"), profile)
}
