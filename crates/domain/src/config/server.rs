use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Local listener endpoints the fast-track rules special-case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port of the local API.
    pub api_port: u16,
    /// IP the local nameserver binds.
    pub nameserver_ip: IpAddr,
    /// Port of the local nameserver.
    pub nameserver_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: 817,
            nameserver_ip: IpAddr::from([127, 0, 0, 53]),
            nameserver_port: 53,
        }
    }
}
