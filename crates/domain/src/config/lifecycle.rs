use serde::{Deserialize, Serialize};

/// Cadences and grace periods of the connection lifecycle workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub cleaner_interval_secs: u64,
    /// Delete ended IP connections after this grace.
    pub ended_grace_secs: i64,
    /// DNS request records live longer so late IP connections can still be
    /// attributed to them.
    pub dns_request_grace_secs: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            cleaner_interval_secs: 10,
            ended_grace_secs: 300,
            dns_request_grace_secs: 600,
        }
    }
}
