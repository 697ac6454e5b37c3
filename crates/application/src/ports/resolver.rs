use std::net::IpAddr;

use vigil_domain::ResolverInfo;

/// Resolver collaborator contract. The actual DNS lookup machinery is not
/// part of the core; the pipeline only needs the resolver's state and
/// identity.
pub trait ResolverPort: Send + Sync {
    /// True when the local resolver is disabled and DNS traffic flows to
    /// upstream servers directly (which makes it eligible for inspection).
    fn is_disabled(&self) -> bool;

    /// IPs the local nameserver listens on.
    fn nameserver_ips(&self) -> Vec<IpAddr>;

    fn is_nameserver_ip(&self, ip: IpAddr) -> bool {
        self.nameserver_ips().contains(&ip)
    }

    /// Metadata describing the active resolver.
    fn resolver_info(&self) -> ResolverInfo;
}
