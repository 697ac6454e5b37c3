#![allow(dead_code)]

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, RwLock};

use vigil_application::ports::{
    ConnectionsViewPort, FilterListPort, GeoIpPort, Location, NetEnvPort, NotifierPort, Prompt,
    ProcessLookupPort, ResolverPort,
};
use vigil_application::services::{EntityEnricher, PromptService};
use vigil_application::{DeciderChain, DnsLinkage, FilterDeps, TunnelState};
use vigil_domain::config::FilterConfig;
use vigil_domain::{
    Connection, CoreError, IpProtocol, LayeredProfile, OnlineStatus, PacketInfo, Process, Profile,
    ProfileSettings, ResolverInfo, ResolverScope,
};

pub const OWN_PID: u32 = 4242;
pub const SYSTEM_RESOLVER_PID: u32 = 153;

// ============================================================================
// Mock NetEnvPort
// ============================================================================

pub struct MockNetEnv {
    pub status: RwLock<OnlineStatus>,
    pub ips: Vec<IpAddr>,
    pub networks: Vec<IpNetwork>,
}

impl MockNetEnv {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(OnlineStatus::Online),
            ips: vec!["10.0.0.2".parse().unwrap()],
            networks: vec!["10.0.0.0/24".parse().unwrap()],
        }
    }

    pub fn set_status(&self, status: OnlineStatus) {
        *self.status.write().unwrap() = status;
    }
}

impl NetEnvPort for MockNetEnv {
    fn online_status(&self) -> OnlineStatus {
        *self.status.read().unwrap()
    }

    fn local_ips(&self) -> Vec<IpAddr> {
        self.ips.clone()
    }

    fn local_networks(&self) -> Vec<IpNetwork> {
        self.networks.clone()
    }
}

// ============================================================================
// Mock ResolverPort
// ============================================================================

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
            name: "mock".to_string(),
            kind: "dot".to_string(),
            source: "config".to_string(),
            ip: Some("9.9.9.9".parse().unwrap()),
            scope: ResolverScope::Global,
        }
    }
}

// ============================================================================
// Mock FilterListPort
// ============================================================================

#[derive(Default)]
pub struct MockFilterLists {
    pub ready: RwLock<bool>,
    pub domains: RwLock<HashMap<String, Vec<String>>>,
    pub ips: RwLock<HashMap<IpAddr, Vec<String>>>,
    pub asns: RwLock<HashMap<u32, Vec<String>>>,
    pub countries: RwLock<HashMap<String, Vec<String>>>,
}

impl MockFilterLists {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(true),
            ..Default::default()
        }
    }

    pub fn add_domain(&self, domain: &str, lists: &[&str]) {
        self.domains.write().unwrap().insert(
            domain.to_string(),
            lists.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn add_ip(&self, ip: &str, lists: &[&str]) {
        self.ips.write().unwrap().insert(
            ip.parse().unwrap(),
            lists.iter().map(|s| s.to_string()).collect(),
        );
    }
}

#[async_trait]
impl FilterListPort for MockFilterLists {
    fn ready(&self) -> bool {
        *self.ready.read().unwrap()
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

    async fn lookup_ip(&self, ip: IpAddr) -> Result<Vec<String>, CoreError> {
        Ok(self.ips.read().unwrap().get(&ip).cloned().unwrap_or_default())
    }

    async fn lookup_asn(&self, asn: u32) -> Result<Vec<String>, CoreError> {
        Ok(self.asns.read().unwrap().get(&asn).cloned().unwrap_or_default())
    }

    async fn lookup_country(&self, country: &str) -> Result<Vec<String>, CoreError> {
        Ok(self
            .countries
            .read()
            .unwrap()
            .get(country)
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Mock GeoIpPort
// ============================================================================

#[derive(Default)]
pub struct MockGeoIp {
    pub locations: RwLock<HashMap<IpAddr, Location>>,
}

impl MockGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, ip: &str, country: &str, asn: u32) {
        self.locations.write().unwrap().insert(
            ip.parse().unwrap(),
            Location {
                country: country.to_string(),
                asn,
                coordinates: None,
                accuracy_km: 50,
            },
        );
    }
}

#[async_trait]
impl GeoIpPort for MockGeoIp {
    async fn location(&self, ip: IpAddr) -> Result<Option<Location>, CoreError> {
        Ok(self.locations.read().unwrap().get(&ip).cloned())
    }
}

// ============================================================================
// Mock ProcessLookupPort
// ============================================================================

pub struct MockProcessLookup {
    pub processes: RwLock<HashMap<u32, Process>>,
    pub pids: RwLock<HashMap<String, u32>>,
    pub active_ids: RwLock<Vec<String>>,
}

impl MockProcessLookup {
    pub fn new() -> Self {
        Self {
            processes: RwLock::new(HashMap::new()),
            pids: RwLock::new(HashMap::new()),
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
        if let Some(pid) = packet.pid {
            return Ok(Some(pid));
        }
        Ok(self.pids.read().unwrap().get(&packet.connection_id()).copied())
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

// ============================================================================
// Mock ConnectionsViewPort
// ============================================================================

#[derive(Default)]
pub struct MockConnectionsView {
    pub broadcast_query_remote: Mutex<Option<IpAddr>>,
    pub connections: Mutex<Vec<Connection>>,
}

impl MockConnectionsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_broadcast_query(&self, remote: &str) {
        *self.broadcast_query_remote.lock().unwrap() = Some(remote.parse().unwrap());
    }
}

impl ConnectionsViewPort for MockConnectionsView {
    fn find_broadcast_query(
        &self,
        _protocol: IpProtocol,
        _local_ip: IpAddr,
        _local_port: u16,
        _pid: u32,
    ) -> Option<IpAddr> {
        *self.broadcast_query_remote.lock().unwrap()
    }

    fn snapshot(&self) -> Vec<Connection> {
        self.connections.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock NotifierPort
// ============================================================================

pub struct MockNotifier {
    pub answer: RwLock<Option<String>>,
    /// Never conclude the prompt; the caller's timeout fires instead.
    pub hang: RwLock<bool>,
    pub prompts: Mutex<Vec<Prompt>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl MockNotifier {
    pub fn new(answer: Option<&str>) -> Self {
        Self {
            answer: RwLock::new(answer.map(str::to_string)),
            hang: RwLock::new(false),
            prompts: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn set_hang(&self, hang: bool) {
        *self.hang.write().unwrap() = hang;
    }
}

#[async_trait]
impl NotifierPort for MockNotifier {
    async fn prompt(&self, prompt: Prompt) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt);
        if *self.hang.read().unwrap() {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
        self.answer.read().unwrap().clone()
    }

    async fn cancel(&self, event_id: &str) {
        self.cancelled.lock().unwrap().push(event_id.to_string());
    }
}

// ============================================================================
// Deps assembly
// ============================================================================

pub struct TestEnv {
    pub netenv: Arc<MockNetEnv>,
    pub resolver: Arc<MockResolver>,
    pub lists: Arc<MockFilterLists>,
    pub geoip: Arc<MockGeoIp>,
    pub processes: Arc<MockProcessLookup>,
    pub connections: Arc<MockConnectionsView>,
    pub notifier: Arc<MockNotifier>,
    pub prompts: Arc<PromptService>,
    pub linkage: Arc<DnsLinkage>,
    pub tunnel: Arc<TunnelState>,
}

impl TestEnv {
    pub fn new() -> Self {
        let notifier = Arc::new(MockNotifier::new(None));
        Self {
            netenv: Arc::new(MockNetEnv::new()),
            resolver: Arc::new(MockResolver::new()),
            lists: Arc::new(MockFilterLists::new()),
            geoip: Arc::new(MockGeoIp::new()),
            processes: Arc::new(MockProcessLookup::new()),
            connections: Arc::new(MockConnectionsView::new()),
            notifier: notifier.clone(),
            prompts: Arc::new(PromptService::new(notifier, 1)),
            linkage: Arc::new(DnsLinkage::new(None)),
            tunnel: Arc::new(TunnelState::default()),
        }
    }

    pub fn chain(&self) -> DeciderChain {
        let deps = FilterDeps {
            config: FilterConfig::default(),
            own_pid: OWN_PID,
            netenv: self.netenv.clone(),
            resolver: self.resolver.clone(),
            filter_lists: self.lists.clone(),
            process_lookup: self.processes.clone(),
            connections: self.connections.clone(),
            enricher: EntityEnricher::new(self.geoip.clone(), self.lists.clone()),
            prompts: self.prompts.clone(),
            linkage: self.linkage.clone(),
            tunnel: self.tunnel.clone(),
        };
        DeciderChain::new(Arc::new(deps))
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn layered_profile(local: ProfileSettings, global: ProfileSettings) -> Arc<LayeredProfile> {
    let local = Arc::new(Profile::new("local", "app-profile", "App").with_settings(local));
    let global = Arc::new(Profile::new("special", "global-config", "Global").with_settings(global));
    Arc::new(LayeredProfile::new(local, global))
}

pub fn make_process(pid: u32, path: &str, name: &str, profile: Arc<LayeredProfile>) -> Process {
    let exec = path.rsplit('/').next().unwrap_or(name).to_string();
    Process::new(pid, path, name, exec, 1, format!("{path} --run"), profile)
}
