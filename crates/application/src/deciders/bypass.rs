use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{Connection, IpProtocol, Reason, ResolvedProfile};

use super::{Decision, FilterDeps};

/// The Firefox DoH canary: answering this query NXDOMAIN-style disables
/// application-level DNS in the browser.
const DOH_CANARY: &str = "use-application-dns.net.";

const DNS_PORT: u16 = 53;
const DOT_PORT: u16 = 853;

/// Bypass prevention: keep DNS on the path the firewall controls.
pub(super) async fn check_bypass_prevention(
    deps: &FilterDeps,
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    if !profile.prevent_bypassing || conn.direction.is_inbound() || conn.protocol.is_icmp() {
        return None;
    }

    if conn.entity.domain.as_deref() == Some(DOH_CANARY) {
        return Some(Decision::Denied(Reason::with_option(
            "blocked DoH canary domain to keep DNS resolvable locally",
            options::PREVENT_BYPASSING,
        )));
    }

    let from_system_resolver = conn
        .pid()
        .map(|pid| deps.process_lookup.is_system_resolver(pid))
        .unwrap_or(false);

    if matches!(conn.entity.port, DNS_PORT | DOT_PORT) && !from_system_resolver {
        return Some(Decision::Denied(Reason::with_option(
            "direct DNS traffic is only allowed for the system resolver",
            options::PREVENT_BYPASSING,
        )));
    }

    // Known DNS bypass endpoints (DoH providers and friends).
    if conn.entity.lists_fetched() && conn.entity.on_list(&deps.config.dns_bypass_list) {
        return Some(Decision::Denied(Reason::with_option(
            "endpoint is a known DNS bypass provider",
            options::PREVENT_BYPASSING,
        )));
    }

    // With the local resolver disabled, plain DNS flows out directly; mark
    // them for payload inspection so observed answers still feed the
    // IP→domain map.
    if deps.resolver.is_disabled()
        && conn.protocol == IpProtocol::Udp
        && conn.entity.port == DNS_PORT
    {
        debug!(conn = %conn.id, "Marking outgoing DNS request for inspection");
        conn.inspecting = true;
    }

    None
}
