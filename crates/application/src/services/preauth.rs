use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use std::time::{Duration, Instant};

use vigil_domain::IpProtocol;

/// How long a permitted port stays valid without being used.
const PORT_TTL: Duration = Duration::from_secs(60);

/// Ephemeral local ports the firewall allocates to itself for outbound
/// dialling. A connection arriving on a permitted port is attributed as
/// internal; the permit is consumed by that first connection.
pub struct PreAuthPorts {
    ports: DashMap<(u8, u16), Instant, FxBuildHasher>,
}

impl PreAuthPorts {
    pub fn new() -> Self {
        Self {
            ports: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Allocate a fresh ephemeral port for the given protocol.
    pub fn get_permitted_port(&self, protocol: IpProtocol) -> u16 {
        loop {
            let port = fastrand::u16(10_000..u16::MAX);
            let key = (protocol.number(), port);
            if !self.ports.contains_key(&key) {
                self.ports.insert(key, Instant::now() + PORT_TTL);
                return port;
            }
        }
    }

    /// Consume the permit for (protocol, port). Returns true exactly once
    /// per permitted port.
    pub fn use_port(&self, protocol: IpProtocol, port: u16) -> bool {
        match self.ports.remove(&(protocol.number(), port)) {
            Some((_, expires)) => expires > Instant::now(),
            None => false,
        }
    }

    /// Drop expired permits.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.ports.retain(|_, expires| *expires > now);
    }
}

impl Default for PreAuthPorts {
    fn default() -> Self {
        Self::new()
    }
}
