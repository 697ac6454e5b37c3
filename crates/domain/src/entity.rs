use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::fqdn;
use crate::netenv::IpScope;
use crate::packet::IpProtocol;

/// Lazily-populated snapshot of the remote end of a connection.
///
/// Each facet (location, list memberships per domain/IP/ASN/country) has an
/// independent one-shot guard: the enrichment service checks the flag,
/// performs the external lookup, then stores the result and sets the flag.
/// A failed lookup leaves the flag clear so the next caller retries.
/// Entities are owned by their connection and never shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    pub domain: Option<String>,
    pub cnames: Vec<String>,
    pub ip: Option<IpAddr>,
    pub protocol: Option<IpProtocol>,
    pub port: u16,

    pub country: Option<String>,
    pub asn: Option<u32>,
    location_fetched: bool,

    domain_lists: BTreeSet<String>,
    ip_lists: BTreeSet<String>,
    asn_lists: BTreeSet<String>,
    country_lists: BTreeSet<String>,
    domain_lists_fetched: bool,
    ip_lists_fetched: bool,
    asn_lists_fetched: bool,
    country_lists_fetched: bool,

    resolve_sub_domain_lists: bool,
    /// Set when a toggle arrived after the domain facet was populated.
    pub sub_domain_toggle_ignored: bool,
}

impl Entity {
    pub fn from_ip(ip: IpAddr, protocol: IpProtocol, port: u16) -> Self {
        Self {
            ip: Some(ip),
            protocol: Some(protocol),
            port,
            ..Default::default()
        }
    }

    pub fn from_domain(domain: &str) -> Self {
        Self {
            domain: Some(fqdn::normalize(domain)),
            ..Default::default()
        }
    }

    pub fn set_domain(&mut self, domain: &str) {
        self.domain = Some(fqdn::normalize(domain));
    }

    pub fn ip_scope(&self) -> IpScope {
        self.ip.map(IpScope::classify).unwrap_or(IpScope::Undefined)
    }

    // ------------------------------------------------------------------
    // Location facet
    // ------------------------------------------------------------------

    pub fn location_fetched(&self) -> bool {
        self.location_fetched
    }

    pub fn set_location(&mut self, country: Option<String>, asn: Option<u32>) {
        self.country = country;
        self.asn = asn;
        self.location_fetched = true;
    }

    /// Clear the guard so the next enrichment retries the lookup.
    pub fn clear_location(&mut self) {
        self.location_fetched = false;
    }

    // ------------------------------------------------------------------
    // List facets
    // ------------------------------------------------------------------

    /// Must be decided before the domain-list facet is populated; once that
    /// facet is set, toggling is recorded as ignored and has no effect.
    pub fn resolve_sub_domain_lists(&mut self, enable: bool) {
        if self.domain_lists_fetched {
            if enable != self.resolve_sub_domain_lists {
                self.sub_domain_toggle_ignored = true;
            }
            return;
        }
        self.resolve_sub_domain_lists = enable;
    }

    /// The domains the list lookup should consult: the exact domain only,
    /// or its full sub-domain expansion when enabled.
    pub fn list_lookup_domains(&self) -> Vec<String> {
        match &self.domain {
            None => Vec::new(),
            Some(d) if self.resolve_sub_domain_lists => fqdn::sub_domains(d),
            Some(d) => vec![d.clone()],
        }
    }

    pub fn domain_lists_fetched(&self) -> bool {
        self.domain_lists_fetched
    }

    pub fn set_domain_lists(&mut self, lists: impl IntoIterator<Item = String>) {
        self.domain_lists = lists.into_iter().collect();
        self.domain_lists_fetched = true;
    }

    pub fn ip_lists_fetched(&self) -> bool {
        self.ip_lists_fetched
    }

    pub fn set_ip_lists(&mut self, lists: impl IntoIterator<Item = String>) {
        self.ip_lists = lists.into_iter().collect();
        self.ip_lists_fetched = true;
    }

    pub fn asn_lists_fetched(&self) -> bool {
        self.asn_lists_fetched
    }

    pub fn set_asn_lists(&mut self, lists: impl IntoIterator<Item = String>) {
        self.asn_lists = lists.into_iter().collect();
        self.asn_lists_fetched = true;
    }

    pub fn country_lists_fetched(&self) -> bool {
        self.country_lists_fetched
    }

    pub fn set_country_lists(&mut self, lists: impl IntoIterator<Item = String>) {
        self.country_lists = lists.into_iter().collect();
        self.country_lists_fetched = true;
    }

    pub fn lists_fetched(&self) -> bool {
        self.domain_lists_fetched
            && self.ip_lists_fetched
            && self.asn_lists_fetched
            && self.country_lists_fetched
    }

    /// Union of all list memberships, sorted for stable reason context.
    pub fn all_lists(&self) -> Vec<String> {
        let mut merged: BTreeSet<String> = BTreeSet::new();
        merged.extend(self.domain_lists.iter().cloned());
        merged.extend(self.ip_lists.iter().cloned());
        merged.extend(self.asn_lists.iter().cloned());
        merged.extend(self.country_lists.iter().cloned());
        merged.into_iter().collect()
    }

    pub fn on_list(&self, list_id: &str) -> bool {
        self.domain_lists.contains(list_id)
            || self.ip_lists.contains(list_id)
            || self.asn_lists.contains(list_id)
            || self.country_lists.contains(list_id)
    }

    /// Clear all list facets and their guards so a configuration change
    /// causes re-lookup.
    pub fn reset_lists(&mut self) {
        self.domain_lists.clear();
        self.ip_lists.clear();
        self.asn_lists.clear();
        self.country_lists.clear();
        self.domain_lists_fetched = false;
        self.ip_lists_fetched = false;
        self.asn_lists_fetched = false;
        self.country_lists_fetched = false;
    }
}
