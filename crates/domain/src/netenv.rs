use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Classification of an IP address relative to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpScope {
    Invalid,
    Undefined,
    HostLocal,
    LinkLocal,
    SiteLocal,
    Global,
    LocalMulticast,
    GlobalMulticast,
}

/// Coarse policy band used by the scope toggles: Localhost, LAN, Internet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeBand {
    Localhost,
    Lan,
    Internet,
    Invalid,
}

impl ScopeBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeBand::Localhost => "Localhost",
            ScopeBand::Lan => "LAN",
            ScopeBand::Internet => "Internet",
            ScopeBand::Invalid => "Invalid",
        }
    }
}

impl IpScope {
    pub fn classify(ip: IpAddr) -> IpScope {
        match ip {
            IpAddr::V4(v4) => Self::classify_v4(v4),
            IpAddr::V6(v6) => Self::classify_v6(v6),
        }
    }

    fn classify_v4(ip: Ipv4Addr) -> IpScope {
        let octets = ip.octets();
        if ip.is_unspecified() {
            return IpScope::Invalid;
        }
        if ip.is_loopback() {
            return IpScope::HostLocal;
        }
        if ip.is_link_local() {
            return IpScope::LinkLocal;
        }
        if ip.is_private() || (octets[0] == 100 && (octets[1] & 0b1100_0000) == 64) {
            return IpScope::SiteLocal;
        }
        if ip.is_multicast() {
            // 224.0.0.0/8 and 239.0.0.0/8 stay on the local network.
            return if octets[0] == 224 || octets[0] == 239 {
                IpScope::LocalMulticast
            } else {
                IpScope::GlobalMulticast
            };
        }
        if ip.is_broadcast() {
            return IpScope::LocalMulticast;
        }
        if octets[0] == 0 || octets[0] >= 240 {
            return IpScope::Invalid;
        }
        IpScope::Global
    }

    fn classify_v6(ip: Ipv6Addr) -> IpScope {
        if ip.is_unspecified() {
            return IpScope::Invalid;
        }
        if ip.is_loopback() {
            return IpScope::HostLocal;
        }
        let segments = ip.segments();
        if (segments[0] & 0xffc0) == 0xfe80 {
            return IpScope::LinkLocal;
        }
        if (segments[0] & 0xfe00) == 0xfc00 {
            return IpScope::SiteLocal;
        }
        if ip.is_multicast() {
            // ff02 link-local and ff05 site-local scopes stay local.
            return match segments[0] & 0x000f {
                0x1 | 0x2 | 0x5 => IpScope::LocalMulticast,
                _ => IpScope::GlobalMulticast,
            };
        }
        IpScope::Global
    }

    /// Collapse to the band the profile scope toggles operate on.
    pub fn band(&self) -> ScopeBand {
        match self {
            IpScope::HostLocal => ScopeBand::Localhost,
            IpScope::LinkLocal | IpScope::SiteLocal | IpScope::LocalMulticast => ScopeBand::Lan,
            IpScope::Global | IpScope::GlobalMulticast => ScopeBand::Internet,
            IpScope::Invalid | IpScope::Undefined => ScopeBand::Invalid,
        }
    }

    pub fn is_local_network(&self) -> bool {
        matches!(self.band(), ScopeBand::Localhost | ScopeBand::Lan)
    }
}

/// Directed broadcast address of the network containing `ip`, e.g.
/// `192.168.1.0/24` → `192.168.1.255`. IPv6 has no broadcast.
pub fn directed_broadcast(network: &IpNetwork) -> Option<IpAddr> {
    match network {
        IpNetwork::V4(net) => Some(IpAddr::V4(net.broadcast())),
        IpNetwork::V6(_) => None,
    }
}

/// True if `remote` is the limited broadcast, a local multicast scope, or
/// the directed broadcast of one of the given local networks.
pub fn is_broadcast_or_multicast(remote: IpAddr, local_networks: &[IpNetwork]) -> bool {
    if remote == IpAddr::V4(Ipv4Addr::BROADCAST) {
        return true;
    }
    if IpScope::classify(remote) == IpScope::LocalMulticast {
        return true;
    }
    local_networks
        .iter()
        .filter_map(directed_broadcast)
        .any(|b| b == remote)
}

/// Connectivity state of the network environment as reported by the
/// environment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnlineStatus {
    Unknown,
    Offline,
    Limited,
    /// Captive-portal style environment; connectivity-check domains get a
    /// bootstrap grace.
    Portal,
    Online,
}

impl OnlineStatus {
    pub fn is_portal(&self) -> bool {
        matches!(self, OnlineStatus::Portal)
    }
}
