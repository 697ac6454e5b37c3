use serde_json::json;
use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{
    Connection, ConnectionKind, EndpointMatch, EndpointRule, Entity, Reason, ResolvedProfile,
    Selector,
};

use super::{Decision, FilterDeps};

/// First-match evaluation of an ordered rule list against an entity.
/// A rule that cannot be evaluated because entity data is missing blocks
/// for safety.
pub(crate) fn check_rules(
    rules: &[EndpointRule],
    entity: &Entity,
    option_key: &str,
) -> Option<Decision> {
    for rule in rules {
        match rule.match_entity(entity) {
            EndpointMatch::Permitted => {
                return Some(Decision::Allowed(
                    Reason::with_option(format!("permitted by rule {rule}"), option_key)
                        .with_context(json!({"rule": rule.stringify()})),
                ));
            }
            EndpointMatch::Denied => {
                return Some(Decision::Denied(
                    Reason::with_option(format!("denied by rule {rule}"), option_key)
                        .with_context(json!({"rule": rule.stringify()})),
                ));
            }
            EndpointMatch::MatchError(message) => {
                debug!(rule = %rule, message, "Endpoint rule not evaluable, blocking for safety");
                return Some(Decision::Denied(Reason::with_option(
                    format!("rule {rule} could not be evaluated: {message}"),
                    option_key,
                )));
            }
            EndpointMatch::NoMatch => {}
        }
    }
    None
}

/// Whether any rule in scope needs the location or list facets.
pub(super) fn rules_need_entity_data(conn: &Connection, profile: &ResolvedProfile) -> bool {
    let rules: Vec<&EndpointRule> = if conn.direction.is_inbound() {
        profile.service_rules().collect()
    } else {
        profile.outbound_rules().collect()
    };
    rules.iter().any(|r| {
        matches!(
            r.selector,
            Selector::Asn(_) | Selector::Country(_) | Selector::Lists(_)
        )
    })
}

/// Endpoint list evaluation: outbound connections test the outbound list,
/// inbound flows the service list. DNS requests issued by the host system
/// resolver test only the local profile's list, because the real
/// requester is unknown.
pub(super) async fn check_endpoint_lists(
    deps: &FilterDeps,
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    if conn.direction.is_inbound() {
        let rules: Vec<EndpointRule> = profile.service_rules().cloned().collect();
        return check_rules(&rules, &conn.entity, options::SERVICE_ENDPOINTS);
    }

    let system_resolver_dns = conn.kind == ConnectionKind::DnsRequest
        && conn
            .pid()
            .map(|pid| deps.process_lookup.is_system_resolver(pid))
            .unwrap_or(false);

    let rules: Vec<EndpointRule> = if system_resolver_dns {
        profile.local_endpoints.clone()
    } else {
        profile.outbound_rules().cloned().collect()
    };
    check_rules(&rules, &conn.entity, options::ENDPOINTS)
}
