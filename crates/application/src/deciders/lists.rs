use serde_json::json;
use tracing::warn;

use vigil_domain::config::{options, FilterConfig};
use vigil_domain::{Connection, Entity, Reason, ResolvedProfile};

use super::{Decision, FilterDeps};

/// Filter-list membership of an entity against the profile's selected
/// lists: any blocked-list hit denies unless an unbreak list also matches.
pub(super) fn entity_list_denial(
    entity: &Entity,
    profile: &ResolvedProfile,
    config: &FilterConfig,
) -> Option<Decision> {
    if profile.filter_lists.is_empty() {
        return None;
    }
    if !entity.lists_fetched() {
        // Degradation: list data unavailable, continue without it.
        warn!("filterlists disabled: membership data unavailable");
        return None;
    }

    let hits: Vec<String> = profile
        .filter_lists
        .iter()
        .filter(|id| entity.on_list(id))
        .cloned()
        .collect();
    if hits.is_empty() {
        return None;
    }

    let unbroken = profile
        .unbreak_lists
        .iter()
        .chain(config.unbreak_lists.iter())
        .any(|id| entity.on_list(id));
    if unbroken {
        return None;
    }

    Some(Decision::Denied(
        Reason::with_option(
            format!("endpoint is on filter lists: {}", hits.join(", ")),
            options::FILTER_LISTS,
        )
        .with_context(json!({"lists": hits})),
    ))
}

pub(super) fn check_filter_lists(
    deps: &FilterDeps,
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    entity_list_denial(&conn.entity, profile, &deps.config)
}

/// User-provided filter entries: domains (including parent zones), CNAMEs,
/// IPs, ASNs and countries. Any hit denies.
pub(super) fn check_custom_filter_list(
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    let custom = &profile.custom_filter;
    if custom.is_empty() {
        return None;
    }

    let deny = |what: String| {
        Some(Decision::Denied(Reason::with_option(
            format!("{what} is on the custom filter list"),
            options::CUSTOM_FILTER_LIST,
        )))
    };

    if let Some(domain) = &conn.entity.domain {
        // Check the domain and every parent zone.
        for candidate in vigil_domain::fqdn::sub_domains(domain) {
            if custom.domains.contains(&candidate) {
                return deny(format!("domain {candidate}"));
            }
        }
    }
    for cname in &conn.entity.cnames {
        if custom.domains.contains(cname) {
            return deny(format!("CNAME {cname}"));
        }
    }
    if let Some(ip) = conn.entity.ip {
        if custom.ips.contains(&ip) {
            return deny(format!("IP {ip}"));
        }
    }
    if let Some(asn) = conn.entity.asn {
        if custom.asns.contains(&asn) {
            return deny(format!("AS{asn}"));
        }
    }
    if let Some(country) = &conn.entity.country {
        if custom.countries.contains(country) {
            return deny(format!("country {country}"));
        }
    }
    None
}
