use std::net::IpAddr;

use vigil_domain::{Connection, IpProtocol};

/// Read-only view of the live connection tables, implemented by the
/// connection store. Deciders use it for cross-connection checks without
/// depending on the store itself.
pub trait ConnectionsViewPort: Send + Sync {
    /// Scan for a live outbound multicast/broadcast query matching the
    /// given reply tuple (protocol, local port, local IP, process).
    /// Returns the remote address of the query if found.
    fn find_broadcast_query(
        &self,
        protocol: IpProtocol,
        local_ip: IpAddr,
        local_port: u16,
        pid: u32,
    ) -> Option<IpAddr>;

    /// Shallow snapshot of all live connections (IP and DNS tables).
    fn snapshot(&self) -> Vec<Connection>;
}
