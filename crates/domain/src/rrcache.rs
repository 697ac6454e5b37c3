use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::dns_record::RrEntry;

/// TTL handed to downstream consumers, so nothing caches longer than the
/// firewall chooses.
pub const DOWNSTREAM_TTL: u32 = 17;

/// Scope of a resolver as published by the resolver collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolverScope {
    Global,
    Lan,
    Localhost,
}

/// Metadata describing the resolver that produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverInfo {
    pub name: String,
    pub kind: String,
    pub source: String,
    pub ip: Option<IpAddr>,
    pub scope: ResolverScope,
}

impl ResolverInfo {
    pub fn system_resolver() -> Self {
        Self {
            name: "system".to_string(),
            kind: "plain".to_string(),
            source: "system".to_string(),
            ip: None,
            scope: ResolverScope::Global,
        }
    }
}

/// A DNS response snapshot: question, record sections, expiry, resolver
/// descriptor and sanitisation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RrCache {
    pub domain: String,
    pub question: String,
    pub rcode: u16,
    pub answers: Vec<RrEntry>,
    pub ns: Vec<RrEntry>,
    pub extra: Vec<RrEntry>,
    /// Unix seconds.
    pub expires: i64,
    pub resolver: ResolverInfo,

    /// UI hints, not correctness.
    pub served_from_cache: bool,
    pub requesting_new: bool,

    pub filtered: bool,
    /// Textual form of entries removed by sanitisation.
    pub filtered_entries: Vec<String>,
}

impl RrCache {
    pub fn new(domain: impl Into<String>, question: impl Into<String>, resolver: ResolverInfo) -> Self {
        Self {
            domain: domain.into(),
            question: question.into(),
            rcode: 0,
            answers: Vec::new(),
            ns: Vec::new(),
            extra: Vec::new(),
            expires: 0,
            resolver,
            served_from_cache: false,
            requesting_new: false,
            filtered: false,
            filtered_entries: Vec::new(),
        }
    }

    /// Clamp TTLs for storage: every RR gets the low downstream constant,
    /// and `expires` is now plus the minimum original answer TTL, raised to
    /// at least `min_expires` seconds.
    pub fn clean(&mut self, min_expires: u32) {
        let min_ttl = self
            .answers
            .iter()
            .map(|rr| rr.ttl)
            .min()
            .unwrap_or(min_expires);
        let clamped = min_ttl.max(min_expires);

        for rr in self
            .answers
            .iter_mut()
            .chain(self.ns.iter_mut())
            .chain(self.extra.iter_mut())
        {
            rr.ttl = DOWNSTREAM_TTL;
        }

        self.expires = Utc::now().timestamp() + i64::from(clamped);
    }

    pub fn is_expired(&self) -> bool {
        self.expires <= Utc::now().timestamp()
    }

    /// Record a sanitisation removal.
    pub fn mark_filtered(&mut self, entry: &RrEntry) {
        self.filtered = true;
        self.filtered_entries.push(entry.to_line());
    }

    /// Storage key for this response snapshot.
    pub fn record_key(&self) -> String {
        format!("cache:intel/nameRecord/{}{}", self.domain, self.question)
    }
}
