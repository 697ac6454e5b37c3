use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Floor for the `expires` clamp of stored DNS responses, seconds.
    pub min_cache_ttl: u32,
    /// Keep name records this long past expiry for attribution lookups.
    pub name_record_grace_secs: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            min_cache_ttl: 120,
            name_record_grace_secs: 3600,
        }
    }
}
