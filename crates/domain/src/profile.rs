use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use crate::endpoints::EndpointRule;

/// What to do when the decider chain ends without a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DefaultAction {
    #[default]
    Permit,
    Ask,
    Block,
}

impl DefaultAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultAction::Permit => "permit",
            DefaultAction::Ask => "ask",
            DefaultAction::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "permit" => Some(DefaultAction::Permit),
            "ask" => Some(DefaultAction::Ask),
            "block" => Some(DefaultAction::Block),
            _ => None,
        }
    }
}

/// User-provided filter entries checked by the custom-filter decider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomFilterList {
    pub domains: HashSet<String>,
    pub ips: HashSet<IpAddr>,
    pub asns: HashSet<u32>,
    pub countries: HashSet<String>,
}

impl CustomFilterList {
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
            && self.ips.is_empty()
            && self.asns.is_empty()
            && self.countries.is_empty()
    }
}

/// Per-layer settings. Every field is optional; the layered profile
/// resolves top-down, first defined value wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSettings {
    pub default_action: Option<DefaultAction>,
    pub block_scope_internet: Option<bool>,
    pub block_scope_lan: Option<bool>,
    pub block_scope_local: Option<bool>,
    pub block_inbound: Option<bool>,
    pub block_p2p: Option<bool>,
    pub prevent_bypassing: Option<bool>,
    pub domain_heuristics: Option<bool>,
    pub remove_out_of_scope_dns: Option<bool>,
    pub remove_blocked_dns: Option<bool>,
    pub cname_filtering: Option<bool>,
    pub auto_permit: Option<bool>,
    pub history_enabled: Option<bool>,
    pub bandwidth_enabled: Option<bool>,
    pub filter_lists: Option<Vec<String>>,
    pub unbreak_lists: Option<Vec<String>>,
    pub endpoints: Option<Vec<EndpointRule>>,
    pub service_endpoints: Option<Vec<EndpointRule>>,
    pub custom_filter: Option<CustomFilterList>,
}

/// A single profile layer (application-specific or global).
#[derive(Debug)]
pub struct Profile {
    pub id: String,
    pub source: String,
    pub name: String,
    settings: RwLock<ProfileSettings>,
}

impl Profile {
    pub fn new(source: impl Into<String>, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            name: name.into(),
            settings: RwLock::new(ProfileSettings::default()),
        }
    }

    pub fn with_settings(self, settings: ProfileSettings) -> Self {
        *self.settings.write().expect("profile settings lock") = settings;
        self
    }

    pub fn scoped_id(&self) -> String {
        format!("{}/{}", self.source, self.id)
    }

    pub fn settings(&self) -> ProfileSettings {
        self.settings.read().expect("profile settings lock").clone()
    }

    pub fn set_settings(&self, settings: ProfileSettings) {
        *self.settings.write().expect("profile settings lock") = settings;
    }
}

/// The effective view of a profile stack, recomputed on `update`.
///
/// Scalar options resolve top-down (application layer first); endpoint
/// lists stay separated per layer because the system-resolver path checks
/// the local list only.
#[derive(Debug, Clone, Default)]
pub struct ResolvedProfile {
    pub default_action: DefaultAction,
    pub block_scope_internet: bool,
    pub block_scope_lan: bool,
    pub block_scope_local: bool,
    pub block_inbound: bool,
    pub block_p2p: bool,
    pub prevent_bypassing: bool,
    pub domain_heuristics: bool,
    pub remove_out_of_scope_dns: bool,
    pub remove_blocked_dns: bool,
    pub cname_filtering: bool,
    pub auto_permit: bool,
    pub history_enabled: bool,
    pub bandwidth_enabled: bool,
    pub filter_lists: Vec<String>,
    pub unbreak_lists: Vec<String>,
    pub local_endpoints: Vec<EndpointRule>,
    pub global_endpoints: Vec<EndpointRule>,
    pub local_service_endpoints: Vec<EndpointRule>,
    pub global_service_endpoints: Vec<EndpointRule>,
    pub custom_filter: CustomFilterList,
}

macro_rules! resolve_bool {
    ($local:expr, $global:expr, $field:ident, $default:expr) => {
        $local
            .$field
            .or($global.$field)
            .unwrap_or($default)
    };
}

impl ResolvedProfile {
    fn resolve(local: &ProfileSettings, global: &ProfileSettings) -> Self {
        Self {
            default_action: local
                .default_action
                .or(global.default_action)
                .unwrap_or_default(),
            block_scope_internet: resolve_bool!(local, global, block_scope_internet, false),
            block_scope_lan: resolve_bool!(local, global, block_scope_lan, false),
            block_scope_local: resolve_bool!(local, global, block_scope_local, false),
            block_inbound: resolve_bool!(local, global, block_inbound, true),
            block_p2p: resolve_bool!(local, global, block_p2p, false),
            prevent_bypassing: resolve_bool!(local, global, prevent_bypassing, true),
            domain_heuristics: resolve_bool!(local, global, domain_heuristics, false),
            remove_out_of_scope_dns: resolve_bool!(local, global, remove_out_of_scope_dns, true),
            remove_blocked_dns: resolve_bool!(local, global, remove_blocked_dns, true),
            cname_filtering: resolve_bool!(local, global, cname_filtering, false),
            auto_permit: resolve_bool!(local, global, auto_permit, true),
            history_enabled: resolve_bool!(local, global, history_enabled, false),
            bandwidth_enabled: resolve_bool!(local, global, bandwidth_enabled, true),
            filter_lists: local
                .filter_lists
                .clone()
                .or_else(|| global.filter_lists.clone())
                .unwrap_or_default(),
            unbreak_lists: local
                .unbreak_lists
                .clone()
                .or_else(|| global.unbreak_lists.clone())
                .unwrap_or_default(),
            local_endpoints: local.endpoints.clone().unwrap_or_default(),
            global_endpoints: global.endpoints.clone().unwrap_or_default(),
            local_service_endpoints: local.service_endpoints.clone().unwrap_or_default(),
            global_service_endpoints: global.service_endpoints.clone().unwrap_or_default(),
            custom_filter: local
                .custom_filter
                .clone()
                .or_else(|| global.custom_filter.clone())
                .unwrap_or_default(),
        }
    }

    /// Ordered outbound endpoint rules, application layer first.
    pub fn outbound_rules(&self) -> impl Iterator<Item = &EndpointRule> {
        self.local_endpoints.iter().chain(self.global_endpoints.iter())
    }

    /// Ordered inbound service endpoint rules, application layer first.
    pub fn service_rules(&self) -> impl Iterator<Item = &EndpointRule> {
        self.local_service_endpoints
            .iter()
            .chain(self.global_service_endpoints.iter())
    }
}

/// A stack of profiles (application-specific over global) with an atomic
/// revision counter so handlers detect staleness without re-locking.
pub struct LayeredProfile {
    local: Arc<Profile>,
    global: Arc<Profile>,
    resolved: RwLock<ResolvedProfile>,
    revision: AtomicU64,
    outdated: AtomicBool,
}

impl LayeredProfile {
    pub fn new(local: Arc<Profile>, global: Arc<Profile>) -> Self {
        let resolved = ResolvedProfile::resolve(&local.settings(), &global.settings());
        Self {
            local,
            global,
            resolved: RwLock::new(resolved),
            revision: AtomicU64::new(1),
            outdated: AtomicBool::new(false),
        }
    }

    pub fn local_layer(&self) -> &Profile {
        &self.local
    }

    pub fn global_layer(&self) -> &Profile {
        &self.global
    }

    /// Scoped ID (`source/id`) of the application layer.
    pub fn scoped_id(&self) -> String {
        self.local.scoped_id()
    }

    pub fn needs_update(&self) -> bool {
        self.outdated.load(Ordering::Acquire)
    }

    pub fn mark_outdated(&self) {
        self.outdated.store(true, Ordering::Release);
    }

    /// Recompute the resolved view from the layers and bump the revision.
    /// Returns the new revision counter.
    pub fn update(&self) -> u64 {
        let resolved = ResolvedProfile::resolve(&self.local.settings(), &self.global.settings());
        *self.resolved.write().expect("resolved profile lock") = resolved;
        self.outdated.store(false, Ordering::Release);
        self.revision.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn revision_cnt(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Read-lock the resolved view for the duration of one decider run.
    pub fn lock_for_usage(&self) -> RwLockReadGuard<'_, ResolvedProfile> {
        self.resolved.read().expect("resolved profile lock")
    }
}

impl std::fmt::Debug for LayeredProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredProfile")
            .field("local", &self.local.scoped_id())
            .field("global", &self.global.scoped_id())
            .field("revision", &self.revision_cnt())
            .finish()
    }
}
