use ipnetwork::IpNetwork;
use std::net::IpAddr;

use vigil_domain::OnlineStatus;

/// Network environment collaborator: local addressing and connectivity
/// state.
pub trait NetEnvPort: Send + Sync {
    fn online_status(&self) -> OnlineStatus;

    /// All IPs assigned to this host.
    fn local_ips(&self) -> Vec<IpAddr>;

    /// Networks this host is directly attached to.
    fn local_networks(&self) -> Vec<IpNetwork>;

    fn is_local_ip(&self, ip: IpAddr) -> bool {
        ip.is_loopback() || self.local_ips().contains(&ip)
    }
}
