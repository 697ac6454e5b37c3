//! Stand-in implementations of the external collaborator ports.
//!
//! The packet capture shim, full process identification, GeoIP and the
//! desktop notifier live outside the core; platform integrations replace
//! these at wiring time. What can be answered from the local system
//! (socket tables, interface addressing) is implemented here.

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use vigil_application::ports::{
    GeoIpPort, Location, NetEnvPort, NotifierPort, ProcessLookupPort, Prompt, ResolverPort,
    VerdictSinkPort,
};
use vigil_domain::config::ServerConfig;
use vigil_domain::{
    Connection, CoreError, LayeredProfile, OnlineStatus, PacketAction, PacketInfo, Process,
    Profile, ResolverInfo, ResolverScope,
};

/// Network environment from static configuration. A platform integration
/// replaces this with interface monitoring and portal detection.
pub struct StaticNetEnv {
    pub ips: Vec<IpAddr>,
    pub networks: Vec<IpNetwork>,
}

impl StaticNetEnv {
    pub fn new() -> Self {
        Self {
            ips: vec![
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ],
            networks: Vec::new(),
        }
    }
}

impl NetEnvPort for StaticNetEnv {
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

/// Parse one `/proc/net/{tcp,udp}` address column (`0100007F:0035`).
fn parse_proc_addr(field: &str) -> Option<(IpAddr, u16)> {
    let (ip_hex, port_hex) = field.split_once(':')?;
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    match ip_hex.len() {
        8 => {
            let raw = u32::from_str_radix(ip_hex, 16).ok()?;
            Some((IpAddr::V4(Ipv4Addr::from(raw.swap_bytes())), port))
        }
        32 => {
            // Four little-endian 32-bit groups.
            let mut octets = [0u8; 16];
            for (i, chunk) in ip_hex.as_bytes().chunks(8).enumerate() {
                let group = u32::from_str_radix(std::str::from_utf8(chunk).ok()?, 16).ok()?;
                octets[i * 4..(i + 1) * 4].copy_from_slice(&group.swap_bytes().to_be_bytes());
            }
            Some((IpAddr::V6(Ipv6Addr::from(octets)), port))
        }
        _ => None,
    }
}

/// Process identification backed by the Linux socket tables.
///
/// Socket → PID resolution and process → profile mapping are platform
/// integration points; until one is wired in, every process maps onto a
/// single default profile stack.
pub struct ProcSocketTables {
    default_profile: Arc<LayeredProfile>,
}

impl ProcSocketTables {
    pub fn new() -> Self {
        let local = Arc::new(Profile::new("local", "default", "Default"));
        let global = Arc::new(Profile::new("special", "global-config", "Global"));
        Self {
            default_profile: Arc::new(LayeredProfile::new(local, global)),
        }
    }

    async fn read_table(&self, path: &str, protocol: u8, out: &mut Vec<String>) {
        let Ok(content) = fs::read_to_string(path).await else {
            return;
        };
        for line in content.lines().skip(1) {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                continue;
            }
            let Some((local_ip, local_port)) = parse_proc_addr(fields[1]) else {
                continue;
            };
            let Some((remote_ip, remote_port)) = parse_proc_addr(fields[2]) else {
                continue;
            };
            out.push(format!(
                "{protocol}-{local_ip}-{local_port}-{remote_ip}-{remote_port}"
            ));
        }
    }
}

#[async_trait]
impl ProcessLookupPort for ProcSocketTables {
    async fn pid_of_connection(&self, packet: &PacketInfo) -> Result<Option<u32>, CoreError> {
        Ok(packet.pid)
    }

    async fn process(&self, pid: u32) -> Result<Process, CoreError> {
        let path = fs::read_link(format!("/proc/{pid}/exe"))
            .await
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let cmdline = fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .await
            .map(|c| c.replace('\0', " ").trim().to_string())
            .unwrap_or_default();
        let name = path
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("unknown")
            .to_string();
        debug!(pid, path, "Process resolved");
        Ok(Process::new(
            pid,
            path.clone(),
            name.clone(),
            name,
            0,
            cmdline,
            Arc::clone(&self.default_profile),
        ))
    }

    fn is_system_resolver(&self, _pid: u32) -> bool {
        false
    }

    async fn active_connection_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.read_table("/proc/net/tcp", 6, &mut ids).await;
        self.read_table("/proc/net/tcp6", 6, &mut ids).await;
        self.read_table("/proc/net/udp", 17, &mut ids).await;
        self.read_table("/proc/net/udp6", 17, &mut ids).await;
        ids
    }
}

/// GeoIP stand-in: no data. The decider chain treats missing locations as
/// "facet decided, empty".
pub struct NoGeoIp;

#[async_trait]
impl GeoIpPort for NoGeoIp {
    async fn location(&self, _ip: IpAddr) -> Result<Option<Location>, CoreError> {
        Ok(None)
    }
}

/// Notifier stand-in: logs the prompt and reports dismissal, which maps
/// to the deny fallback.
pub struct LogNotifier;

#[async_trait]
impl NotifierPort for LogNotifier {
    async fn prompt(&self, prompt: Prompt) -> Option<String> {
        info!(event = %prompt.event_id, title = %prompt.title, "Prompt raised (no notifier wired, denying)");
        None
    }

    async fn cancel(&self, event_id: &str) {
        debug!(event = event_id, "Prompt cancelled");
    }
}

/// Local resolver descriptor from the server configuration.
pub struct ConfiguredResolver {
    nameserver_ip: IpAddr,
}

impl ConfiguredResolver {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            nameserver_ip: config.nameserver_ip,
        }
    }
}

impl ResolverPort for ConfiguredResolver {
    fn is_disabled(&self) -> bool {
        false
    }

    fn nameserver_ips(&self) -> Vec<IpAddr> {
        vec![self.nameserver_ip]
    }

    fn resolver_info(&self) -> ResolverInfo {
        ResolverInfo {
            name: "vigil-nameserver".to_string(),
            kind: "plain".to_string(),
            source: "config".to_string(),
            ip: Some(self.nameserver_ip),
            scope: ResolverScope::Localhost,
        }
    }
}

/// Verdict sink stand-in: logs every action. The capture layer replaces
/// this with real kernel calls.
pub struct LogVerdictSink;

impl VerdictSinkPort for LogVerdictSink {
    fn issue(&self, packet: &PacketInfo, action: PacketAction) {
        debug!(conn = %packet.connection_id(), ?action, "Verdict issued");
    }

    fn update_connection(&self, conn: &Connection) {
        debug!(conn = %conn.id, verdict = %conn.verdict, "Verdict updated mid-flight");
    }
}
