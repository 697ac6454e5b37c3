use serde::{Deserialize, Serialize};

/// Policy engine settings that are global rather than per-profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Redirect outbound port-53 traffic to the local nameserver.
    pub dns_query_interception: bool,
    /// Ask the capture layer to remember final verdicts.
    pub permanent_verdicts: bool,
    /// Domains granted a bootstrap grace while a captive portal is active.
    pub connectivity_domains: Vec<String>,
    /// How long a user prompt waits before falling back to block.
    pub prompt_timeout_secs: u64,
    /// Filter list IDs treated as "unbreak" overrides.
    pub unbreak_lists: Vec<String>,
    /// Filter list ID carrying known DNS bypass endpoints.
    pub dns_bypass_list: String,
    /// Filter list ID carrying P2P infrastructure endpoints.
    pub p2p_list: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            dns_query_interception: true,
            permanent_verdicts: true,
            connectivity_domains: vec![
                "detectportal.firefox.com.".to_string(),
                "connectivity-check.ubuntu.com.".to_string(),
                "captive.apple.com.".to_string(),
                "connectivitycheck.gstatic.com.".to_string(),
                "www.msftconnecttest.com.".to_string(),
            ],
            prompt_timeout_secs: 3,
            unbreak_lists: vec!["UNBREAK".to_string()],
            dns_bypass_list: "17-DNS".to_string(),
            p2p_list: "05-P2P".to_string(),
        }
    }
}
