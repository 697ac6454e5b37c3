use async_trait::async_trait;
use std::net::IpAddr;

use vigil_domain::CoreError;

/// Filter-list membership lookups. List content fetching is not part of
/// the core; this port only answers "which lists is X on".
#[async_trait]
pub trait FilterListPort: Send + Sync {
    /// False while the list cache is unavailable; the decider chain then
    /// continues with list checks disabled (degradation, not failure).
    fn ready(&self) -> bool;

    async fn lookup_domain(&self, domain: &str) -> Result<Vec<String>, CoreError>;
    async fn lookup_ip(&self, ip: IpAddr) -> Result<Vec<String>, CoreError>;
    async fn lookup_asn(&self, asn: u32) -> Result<Vec<String>, CoreError>;
    async fn lookup_country(&self, country: &str) -> Result<Vec<String>, CoreError>;
}
