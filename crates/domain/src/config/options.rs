//! Profile option keys, used as machine-readable reason annotations on
//! verdicts so the UI can map a decision back to the option that drove it.

pub const DEFAULT_ACTION: &str = "filter/defaultAction";
pub const BLOCK_INTERNET: &str = "filter/blockInternet";
pub const BLOCK_LAN: &str = "filter/blockLAN";
pub const BLOCK_LOCAL: &str = "filter/blockLocal";
pub const BLOCK_INBOUND: &str = "filter/blockInbound";
pub const BLOCK_P2P: &str = "filter/blockP2P";
pub const REQUIRE_DNS: &str = "filter/requireDNS";
pub const PREVENT_BYPASSING: &str = "filter/preventBypassing";
pub const DOMAIN_HEURISTICS: &str = "filter/domainHeuristics";
pub const REMOVE_OUT_OF_SCOPE_DNS: &str = "filter/removeOutOfScopeDNS";
pub const REMOVE_BLOCKED_DNS: &str = "filter/removeBlockedDNS";
pub const CNAME_FILTERING: &str = "filter/cnameFiltering";
pub const ENDPOINTS: &str = "filter/endpoints";
pub const SERVICE_ENDPOINTS: &str = "filter/serviceEndpoints";
pub const FILTER_LISTS: &str = "filter/filterLists";
pub const CUSTOM_FILTER_LIST: &str = "filter/customFilterList";
pub const AUTO_PERMIT: &str = "filter/autoPermit";
pub const CONNECTIVITY_DOMAINS: &str = "filter/connectivityDomains";
