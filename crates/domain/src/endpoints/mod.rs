//! Endpoint definition language: signed, selector-based policy rules of
//! the form `+/- <selector> [<protocol>[/<port-range>]]`.

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::entity::Entity;
use crate::errors::CoreError;
use crate::fqdn;
use crate::netenv::ScopeBand;
use crate::packet::IpProtocol;

/// How a domain pattern is matched against an entity's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainMatchType {
    /// `xxx`: exact match.
    Exact,
    /// `.xxx`: the domain itself and any sub-domain.
    Zone,
    /// `*xxx`: suffix match.
    Suffix,
    /// `xxx*`: prefix match.
    Prefix,
    /// `*xxx*`: substring match.
    Contains,
}

/// Scope selector bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScopeSet {
    pub localhost: bool,
    pub lan: bool,
    pub internet: bool,
}

impl ScopeSet {
    pub fn contains(&self, band: ScopeBand) -> bool {
        match band {
            ScopeBand::Localhost => self.localhost,
            ScopeBand::Lan => self.lan,
            ScopeBand::Internet => self.internet,
            ScopeBand::Invalid => false,
        }
    }

    fn print(&self) -> String {
        let mut parts = Vec::new();
        if self.localhost {
            parts.push("Localhost");
        }
        if self.lan {
            parts.push("LAN");
        }
        if self.internet {
            parts.push("Internet");
        }
        parts.join(",")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Selector {
    Any,
    Domain {
        match_type: DomainMatchType,
        /// The raw pattern, lowercased, with a trailing dot where the
        /// pattern names a concrete zone or domain.
        pattern: String,
    },
    Ip(IpAddr),
    Cidr(IpNetwork),
    Asn(u32),
    Country(String),
    Scope(ScopeSet),
    Lists(Vec<String>),
}

/// Result of testing one rule against an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointMatch {
    Permitted,
    Denied,
    NoMatch,
    /// The rule needs entity data that has not been fetched yet. This
    /// propagates as a block for safety.
    MatchError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRule {
    pub permitted: bool,
    pub selector: Selector,
    pub protocol: Option<IpProtocol>,
    pub port_range: Option<(u16, u16)>,
}

impl EndpointRule {
    /// Parse one rule line. Errors carry the offending token.
    pub fn parse(line: &str) -> Result<Self, CoreError> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(CoreError::InvalidEndpointRule("empty rule".to_string()));
        }

        let permitted = match tokens[0] {
            "+" => {
                tokens.remove(0);
                true
            }
            "-" => {
                tokens.remove(0);
                false
            }
            t if t.starts_with('+') => {
                tokens[0] = &t[1..];
                true
            }
            t if t.starts_with('-') && t.len() > 1 => {
                tokens[0] = &t[1..];
                false
            }
            _ => true,
        };

        let selector_token = tokens
            .first()
            .copied()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CoreError::InvalidEndpointRule("missing selector".to_string()))?;
        let selector = parse_selector(selector_token)?;

        let (protocol, port_range) = match tokens.get(1) {
            None => (None, None),
            Some(tail) => parse_protocol_and_ports(tail)?,
        };

        if tokens.len() > 2 {
            return Err(CoreError::InvalidEndpointRule(format!(
                "trailing token {:?}",
                tokens[2]
            )));
        }

        Ok(Self {
            permitted,
            selector,
            protocol,
            port_range,
        })
    }

    /// Canonical text form; `parse(stringify())` reconstructs the rule.
    pub fn stringify(&self) -> String {
        let sign = if self.permitted { '+' } else { '-' };
        let selector = match &self.selector {
            Selector::Any => "*".to_string(),
            Selector::Domain { pattern, .. } => pattern.clone(),
            Selector::Ip(ip) => ip.to_string(),
            Selector::Cidr(net) => net.to_string(),
            Selector::Asn(asn) => format!("AS{asn}"),
            Selector::Country(cc) => cc.clone(),
            Selector::Scope(set) => set.print(),
            Selector::Lists(ids) => format!("L:{}", ids.join(",")),
        };
        let mut out = format!("{sign} {selector}");
        if let Some(proto) = self.protocol {
            out.push(' ');
            out.push_str(&proto.to_string());
            if let Some((lo, hi)) = self.port_range {
                if lo == hi {
                    out.push_str(&format!("/{lo}"));
                } else {
                    out.push_str(&format!("/{lo}-{hi}"));
                }
            }
        }
        out
    }

    /// Test this rule against an entity. A selector match with satisfied
    /// protocol/port constraints yields `Permitted` or `Denied` per the
    /// rule sign.
    pub fn match_entity(&self, entity: &Entity) -> EndpointMatch {
        if !self.constraints_match(entity) {
            return EndpointMatch::NoMatch;
        }

        let matched = match &self.selector {
            Selector::Any => true,
            Selector::Domain { match_type, pattern } => match &entity.domain {
                Some(domain) => domain_matches(*match_type, pattern, domain),
                None => false,
            },
            Selector::Ip(ip) => entity.ip == Some(*ip),
            Selector::Cidr(net) => entity.ip.map(|ip| net.contains(ip)).unwrap_or(false),
            Selector::Asn(asn) => {
                if !entity.location_fetched() {
                    return EndpointMatch::MatchError("ASN not yet known".to_string());
                }
                entity.asn == Some(*asn)
            }
            Selector::Country(cc) => {
                if !entity.location_fetched() {
                    return EndpointMatch::MatchError("country not yet known".to_string());
                }
                entity.country.as_deref() == Some(cc.as_str())
            }
            Selector::Scope(set) => match entity.ip {
                Some(_) => set.contains(entity.ip_scope().band()),
                None => false,
            },
            Selector::Lists(ids) => {
                if !entity.lists_fetched() {
                    return EndpointMatch::MatchError("list data not yet known".to_string());
                }
                ids.iter().any(|id| entity.on_list(id))
            }
        };

        if !matched {
            EndpointMatch::NoMatch
        } else if self.permitted {
            EndpointMatch::Permitted
        } else {
            EndpointMatch::Denied
        }
    }

    fn constraints_match(&self, entity: &Entity) -> bool {
        if let Some(proto) = self.protocol {
            match entity.protocol {
                Some(p) if p == proto => {}
                _ => return false,
            }
        }
        if let Some((lo, hi)) = self.port_range {
            if entity.port < lo || entity.port > hi {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Display for EndpointRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.stringify())
    }
}

fn domain_matches(match_type: DomainMatchType, pattern: &str, domain: &str) -> bool {
    match match_type {
        DomainMatchType::Exact => domain == pattern,
        DomainMatchType::Zone => {
            // `.example.com.` matches `example.com.` and any sub-domain.
            let base = &pattern[1..];
            domain == base || domain.ends_with(pattern)
        }
        DomainMatchType::Suffix => domain.ends_with(pattern.trim_start_matches('*')),
        DomainMatchType::Prefix => domain.starts_with(pattern.trim_end_matches('*')),
        DomainMatchType::Contains => domain.contains(pattern.trim_matches('*')),
    }
}

/// Selector parsers are tried in order; the first that accepts the token
/// wins. The domain pattern is the lowercase-only fallback, so uppercase
/// forms (ASN, country, scope names) never collide with it.
fn parse_selector(token: &str) -> Result<Selector, CoreError> {
    if token == "*" {
        return Ok(Selector::Any);
    }
    if let Ok(ip) = token.parse::<IpAddr>() {
        return Ok(Selector::Ip(ip));
    }
    if let Ok(net) = token.parse::<IpNetwork>() {
        return Ok(Selector::Cidr(net));
    }
    if let Some(asn) = token
        .strip_prefix("AS")
        .and_then(|rest| rest.parse::<u32>().ok())
    {
        return Ok(Selector::Asn(asn));
    }
    if token.len() == 2 && token.chars().all(|c| c.is_ascii_uppercase()) {
        return Ok(Selector::Country(token.to_string()));
    }
    if let Some(set) = parse_scope_set(token) {
        return Ok(Selector::Scope(set));
    }
    if let Some(ids) = token.strip_prefix("L:") {
        let ids: Vec<String> = ids.split(',').map(str::to_string).collect();
        if ids.iter().any(|id| id.is_empty()) {
            return Err(CoreError::InvalidEndpointRule(format!(
                "invalid list selector {token:?}"
            )));
        }
        return Ok(Selector::Lists(ids));
    }
    if let Some(selector) = parse_domain_selector(token) {
        return Ok(selector);
    }
    Err(CoreError::InvalidEndpointRule(format!(
        "unrecognised selector {token:?}"
    )))
}

fn parse_scope_set(token: &str) -> Option<ScopeSet> {
    let mut set = ScopeSet::default();
    for part in token.split(',') {
        match part.to_ascii_lowercase().as_str() {
            "localhost" => set.localhost = true,
            "lan" => set.lan = true,
            "internet" => set.internet = true,
            _ => return None,
        }
    }
    // A bare "localhost" is also a valid hostname; only treat multi-part
    // tokens or canonical case as a scope selector.
    if token.contains(',') || token.chars().any(|c| c.is_ascii_uppercase()) {
        Some(set)
    } else {
        None
    }
}

fn parse_domain_selector(token: &str) -> Option<Selector> {
    let lowered = token.to_ascii_lowercase();
    if lowered != token {
        // Uppercase forms are reserved for ASN / country selectors.
        return None;
    }

    let stripped = lowered
        .trim_start_matches('*')
        .trim_end_matches('*')
        .trim_start_matches('.');
    if !fqdn::is_valid(stripped) {
        return None;
    }

    let (match_type, pattern) = match (
        lowered.starts_with('*'),
        lowered.ends_with('*'),
        lowered.starts_with('.'),
    ) {
        (true, true, _) => (DomainMatchType::Contains, lowered),
        (true, false, _) => (DomainMatchType::Suffix, lowered),
        (false, true, _) => (DomainMatchType::Prefix, lowered),
        (false, false, true) => (DomainMatchType::Zone, ensure_trailing_dot(lowered)),
        (false, false, false) => (DomainMatchType::Exact, ensure_trailing_dot(lowered)),
    };
    Some(Selector::Domain { match_type, pattern })
}

fn ensure_trailing_dot(mut s: String) -> String {
    if !s.ends_with('.') {
        s.push('.');
    }
    s
}

fn parse_protocol_and_ports(
    token: &str,
) -> Result<(Option<IpProtocol>, Option<(u16, u16)>), CoreError> {
    let (proto_part, port_part) = match token.split_once('/') {
        Some((p, ports)) => (p, Some(ports)),
        None => (token, None),
    };

    let protocol = if let Some(p) = IpProtocol::from_name(proto_part) {
        p
    } else if let Ok(n) = proto_part.parse::<u8>() {
        IpProtocol::from_number(n)
    } else {
        return Err(CoreError::InvalidEndpointRule(format!(
            "unknown protocol {proto_part:?}"
        )));
    };

    let port_range = match port_part {
        None => None,
        Some(ports) => {
            let (lo, hi) = match ports.split_once('-') {
                Some((lo, hi)) => (
                    parse_port(lo)?,
                    parse_port(hi)?,
                ),
                None => {
                    let p = parse_port(ports)?;
                    (p, p)
                }
            };
            if lo > hi {
                return Err(CoreError::InvalidEndpointRule(format!(
                    "invalid port range {ports:?}"
                )));
            }
            Some((lo, hi))
        }
    };

    Ok((Some(protocol), port_range))
}

fn parse_port(s: &str) -> Result<u16, CoreError> {
    s.parse::<u16>()
        .map_err(|_| CoreError::InvalidEndpointRule(format!("invalid port {s:?}")))
}
