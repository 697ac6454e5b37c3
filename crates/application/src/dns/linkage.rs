use chrono::Utc;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use vigil_domain::{IpScope, Record, ResolverInfo, RrCache, ScopeBand};

use crate::ports::StorageInterface;

/// Scope sentinel for associations made by the system resolver or by
/// unattributed requests.
pub const GLOBAL_SCOPE: &str = "global";

/// One observed name→address association.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedDomain {
    pub domain: String,
    pub cnames: Vec<String>,
    pub resolver: ResolverInfo,
    /// Unix seconds.
    pub expires: i64,
}

/// All domains observed resolving to one IP within one profile scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpInfoEntry {
    pub scope: String,
    pub ip: IpAddr,
    pub domains: Vec<ResolvedDomain>,
}

impl IpInfoEntry {
    pub fn record_key(&self) -> String {
        format!("cache:intel/ipInfo/{}/{}", self.scope, self.ip)
    }

    /// Most recently added association that has not expired.
    pub fn current(&self) -> Option<&ResolvedDomain> {
        let now = Utc::now().timestamp();
        self.domains.iter().rev().find(|d| d.expires > now)
    }
}

/// The IP→domain reverse map: attributes subsequent IP connections to the
/// domain that resolved them, scoped per profile with a global fallback.
pub struct DnsLinkage {
    map: DashMap<(String, IpAddr), IpInfoEntry, FxBuildHasher>,
    storage: Option<Arc<dyn StorageInterface>>,
}

impl DnsLinkage {
    pub fn new(storage: Option<Arc<dyn StorageInterface>>) -> Self {
        Self {
            map: DashMap::with_hasher(FxBuildHasher),
            storage,
        }
    }

    /// Digest an observed DNS response: split answer/extra into addresses
    /// and CNAME chains (including SVCB/HTTPS hints) and merge each
    /// non-local IP into the scoped reverse map.
    ///
    /// `profile_scope` is the local profile ID for attributed flows, or
    /// `None` for system-resolver / unattributed requests.
    pub async fn observe_response(&self, cache: &RrCache, profile_scope: Option<&str>) {
        let scope = profile_scope.unwrap_or(GLOBAL_SCOPE).to_string();
        let (ips, cnames) = extract_addresses(cache);
        if ips.is_empty() {
            return;
        }

        let resolved = ResolvedDomain {
            domain: cache.domain.clone(),
            cnames: cname_chain(&cache.domain, &cnames),
            resolver: cache.resolver.clone(),
            expires: cache.expires,
        };

        for ip in ips {
            if IpScope::classify(ip).band() == ScopeBand::Localhost {
                continue;
            }

            let key = (scope.clone(), ip);
            let entry = {
                let mut entry = self.map.entry(key).or_insert_with(|| IpInfoEntry {
                    scope: scope.clone(),
                    ip,
                    domains: Vec::new(),
                });
                // Re-observations refresh the expiry instead of stacking
                // duplicates.
                entry.domains.retain(|d| d.domain != resolved.domain);
                entry.domains.push(resolved.clone());
                entry.clone()
            };

            debug!(ip = %ip, domain = %resolved.domain, scope = %entry.scope, "IP info updated");

            if let Some(storage) = &self.storage {
                match Record::from_value("cache", &entry.record_key()["cache:".len()..], &entry) {
                    Ok(record) => {
                        if let Err(e) = storage.put(record).await {
                            warn!(error = %e, "Failed to persist IP info record");
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialise IP info record"),
                }
            }
        }
    }

    /// Find the domain that resolved `ip` for `scope`, falling back to the
    /// global sentinel scope.
    pub fn lookup(&self, scope: &str, ip: IpAddr) -> Option<ResolvedDomain> {
        for s in [scope, GLOBAL_SCOPE] {
            if let Some(entry) = self.map.get(&(s.to_string(), ip)) {
                if let Some(current) = entry.current() {
                    return Some(current.clone());
                }
            }
        }
        None
    }

    /// Drop expired associations; removes empty entries.
    pub fn cleanup(&self) {
        let now = Utc::now().timestamp();
        self.map.retain(|_, entry| {
            entry.domains.retain(|d| d.expires > now);
            !entry.domains.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Addresses and CNAME links in a response, answer and extra sections
/// combined. SVCB/HTTPS address hints count as addresses.
fn extract_addresses(cache: &RrCache) -> (Vec<IpAddr>, HashMap<String, String>) {
    let mut ips = Vec::new();
    let mut cnames = HashMap::new();

    for rr in cache.answers.iter().chain(cache.extra.iter()) {
        match rr.rtype.as_str() {
            "A" | "AAAA" => {
                if let Ok(ip) = rr.rdata.parse::<IpAddr>() {
                    ips.push(ip);
                }
            }
            "CNAME" => {
                cnames.insert(rr.name.clone(), rr.rdata.clone());
            }
            "SVCB" | "HTTPS" => {
                for part in rr.rdata.split_whitespace() {
                    if let Some(hints) = part
                        .strip_prefix("ipv4hint=")
                        .or_else(|| part.strip_prefix("ipv6hint="))
                    {
                        for hint in hints.split(',') {
                            if let Ok(ip) = hint.parse::<IpAddr>() {
                                ips.push(ip);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    (ips, cnames)
}

/// Follow the CNAME links starting at `domain`. Bounded by the number of
/// links so a looped response cannot spin.
fn cname_chain(domain: &str, links: &HashMap<String, String>) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = domain;
    for _ in 0..links.len() {
        match links.get(current) {
            Some(target) if !chain.contains(target) => {
                chain.push(target.clone());
                current = target;
            }
            _ => break,
        }
    }
    chain
}
