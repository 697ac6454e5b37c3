#![allow(dead_code)]

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::RwLock;

use vigil_application::ports::{NetEnvPort, ProcessLookupPort};
use vigil_domain::{
    CoreError, Direction, IpProtocol, IpVersion, OnlineStatus, PacketInfo, Process,
};

pub struct MockNetEnv;

impl NetEnvPort for MockNetEnv {
    fn online_status(&self) -> OnlineStatus {
        OnlineStatus::Online
    }

    fn local_ips(&self) -> Vec<IpAddr> {
        vec!["10.0.0.2".parse().unwrap()]
    }

    fn local_networks(&self) -> Vec<IpNetwork> {
        vec!["10.0.0.0/24".parse().unwrap()]
    }
}

/// Process lookup stub with a settable OS connection table.
pub struct MockProcessLookup {
    pub active_ids: RwLock<Vec<String>>,
}

impl MockProcessLookup {
    pub fn new() -> Self {
        Self {
            active_ids: RwLock::new(Vec::new()),
        }
    }

    pub fn set_active(&self, ids: &[&str]) {
        *self.active_ids.write().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }
}

#[async_trait]
impl ProcessLookupPort for MockProcessLookup {
    async fn pid_of_connection(&self, packet: &PacketInfo) -> Result<Option<u32>, CoreError> {
        Ok(packet.pid)
    }

    async fn process(&self, _pid: u32) -> Result<Process, CoreError> {
        Err(CoreError::NotFound)
    }

    fn is_system_resolver(&self, _pid: u32) -> bool {
        false
    }

    async fn active_connection_ids(&self) -> Vec<String> {
        self.active_ids.read().unwrap().clone()
    }
}

pub fn outbound_packet(remote: &str, remote_port: u16) -> PacketInfo {
    PacketInfo {
        direction: Direction::Outbound,
        version: IpVersion::V4,
        protocol: IpProtocol::Tcp,
        local_ip: "10.0.0.2".parse().unwrap(),
        local_port: 50_000,
        remote_ip: remote.parse().unwrap(),
        remote_port,
        pid: Some(1217),
        fast_tracked: false,
        info_only: false,
        payload: None,
        icmp: None,
    }
}
