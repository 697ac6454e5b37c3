use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn is_inbound(&self) -> bool {
        matches!(self, Direction::Inbound)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    V4,
    V6,
}

/// IP protocol numbers the firewall cares about.
///
/// `Other` carries the raw protocol number so connection IDs stay stable for
/// protocols without special handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpProtocol {
    Icmp,
    Igmp,
    Tcp,
    Udp,
    Rdp,
    Dccp,
    IcmpV6,
    UdpLite,
    Other(u8),
}

impl IpProtocol {
    pub fn number(&self) -> u8 {
        match self {
            IpProtocol::Icmp => 1,
            IpProtocol::Igmp => 2,
            IpProtocol::Tcp => 6,
            IpProtocol::Udp => 17,
            IpProtocol::Rdp => 27,
            IpProtocol::Dccp => 33,
            IpProtocol::IcmpV6 => 58,
            IpProtocol::UdpLite => 136,
            IpProtocol::Other(n) => *n,
        }
    }

    pub fn from_number(n: u8) -> Self {
        match n {
            1 => IpProtocol::Icmp,
            2 => IpProtocol::Igmp,
            6 => IpProtocol::Tcp,
            17 => IpProtocol::Udp,
            27 => IpProtocol::Rdp,
            33 => IpProtocol::Dccp,
            58 => IpProtocol::IcmpV6,
            136 => IpProtocol::UdpLite,
            other => IpProtocol::Other(other),
        }
    }

    /// Protocol name table used by the endpoint rule language.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "ICMP" => Some(IpProtocol::Icmp),
            "IGMP" => Some(IpProtocol::Igmp),
            "TCP" => Some(IpProtocol::Tcp),
            "UDP" => Some(IpProtocol::Udp),
            "RDP" => Some(IpProtocol::Rdp),
            "DCCP" => Some(IpProtocol::Dccp),
            "ICMP6" | "ICMPV6" => Some(IpProtocol::IcmpV6),
            "UDP-LITE" | "UDPLITE" => Some(IpProtocol::UdpLite),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            IpProtocol::Icmp => Some("ICMP"),
            IpProtocol::Igmp => Some("IGMP"),
            IpProtocol::Tcp => Some("TCP"),
            IpProtocol::Udp => Some("UDP"),
            IpProtocol::Rdp => Some("RDP"),
            IpProtocol::Dccp => Some("DCCP"),
            IpProtocol::IcmpV6 => Some("ICMP6"),
            IpProtocol::UdpLite => Some("UDP-LITE"),
            IpProtocol::Other(_) => None,
        }
    }

    pub fn is_icmp(&self) -> bool {
        matches!(self, IpProtocol::Icmp | IpProtocol::IcmpV6)
    }

    pub fn has_ports(&self) -> bool {
        matches!(
            self,
            IpProtocol::Tcp | IpProtocol::Udp | IpProtocol::UdpLite | IpProtocol::Dccp
        )
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(n) => f.write_str(n),
            None => write!(f, "{}", self.number()),
        }
    }
}

/// One per-packet event delivered by the OS capture layer.
///
/// `info_only` events are metadata-only (stats); they must never result in
/// a packet verdict. The payload is loaded on demand by the capture shim
/// and is `None` until then.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub direction: Direction,
    pub version: IpVersion,
    pub protocol: IpProtocol,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: IpAddr,
    pub remote_port: u16,
    /// PID as reported by the capture layer, if it knows it.
    pub pid: Option<u32>,
    /// The capture layer already fast-tracked this packet.
    pub fast_tracked: bool,
    pub info_only: bool,
    pub payload: Option<Vec<u8>>,
    /// ICMP type/code for ICMP traffic, packed as (type, code).
    pub icmp: Option<(u8, u8)>,
}

impl PacketInfo {
    /// Connection ID: `protocol-localIP-localPort-remoteIP-remotePort`.
    /// Stable for the lifetime of the flow; port-less protocols omit ports.
    pub fn connection_id(&self) -> String {
        if self.protocol.has_ports() {
            format!(
                "{}-{}-{}-{}-{}",
                self.protocol.number(),
                self.local_ip,
                self.local_port,
                self.remote_ip,
                self.remote_port
            )
        } else {
            format!(
                "{}-{}-{}",
                self.protocol.number(),
                self.local_ip,
                self.remote_ip
            )
        }
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }

    /// ICMP echo request (v4 type 8, v6 type 128) or reply (v4 0, v6 129).
    pub fn is_icmp_echo(&self) -> bool {
        match (self.protocol, self.icmp) {
            (IpProtocol::Icmp, Some((t, _))) => t == 0 || t == 8,
            (IpProtocol::IcmpV6, Some((t, _))) => t == 128 || t == 129,
            _ => false,
        }
    }
}
