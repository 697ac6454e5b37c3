use vigil_domain::config::options;
use vigil_domain::{Connection, ConnectionKind, Reason, ResolvedProfile, ScopeBand};

use super::{Decision, FilterDeps};

/// STUN and STUN-over-TLS, the usual P2P hole-punching assist ports.
const P2P_ASSIST_PORTS: [u16; 2] = [3478, 5349];

/// Connection-type policy: inbound gating, P2P blocking, and the
/// require-DNS rule for direct IP connections.
pub(super) fn check_connection_type(
    deps: &FilterDeps,
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    if conn.direction.is_inbound() {
        if profile.block_inbound && conn.entity.ip_scope().band() != ScopeBand::Localhost {
            return Some(Decision::Denied(Reason::with_option(
                "inbound connections are not allowed",
                options::BLOCK_INBOUND,
            )));
        }
        return None;
    }

    if !profile.block_p2p || conn.kind != ConnectionKind::Ip {
        return None;
    }

    if P2P_ASSIST_PORTS.contains(&conn.entity.port) {
        return Some(Decision::Denied(Reason::with_option(
            "STUN traffic is blocked to prevent P2P connections",
            options::BLOCK_P2P,
        )));
    }

    // A direct connection to an Internet IP that no DNS lookup announced
    // is the signature of P2P or hard-coded infrastructure.
    if conn.entity.domain.is_none()
        && conn.entity.ip_scope().band() == ScopeBand::Internet
        && !conn.protocol.is_icmp()
    {
        return Some(Decision::Denied(Reason::with_option(
            "direct connection without prior DNS lookup",
            options::BLOCK_P2P,
        )));
    }

    if conn.entity.lists_fetched() && conn.entity.on_list(&deps.config.p2p_list) {
        return Some(Decision::Denied(Reason::with_option(
            "endpoint is on the P2P infrastructure list",
            options::BLOCK_P2P,
        )));
    }

    None
}

/// Scope policy: block by IP scope band per profile toggles; invalid and
/// undefined addresses are always blocked.
pub(super) fn check_scopes(conn: &mut Connection, profile: &ResolvedProfile) -> Option<Decision> {
    if conn.kind != ConnectionKind::Ip {
        return None;
    }
    match conn.entity.ip_scope().band() {
        ScopeBand::Invalid => Some(Decision::Denied(Reason::new("invalid remote address"))),
        ScopeBand::Localhost if profile.block_scope_local => Some(Decision::Denied(
            Reason::with_option("localhost connections are blocked", options::BLOCK_LOCAL),
        )),
        ScopeBand::Lan if profile.block_scope_lan => Some(Decision::Denied(Reason::with_option(
            "LAN connections are blocked",
            options::BLOCK_LAN,
        ))),
        ScopeBand::Internet if profile.block_scope_internet => {
            Some(Decision::Denied(Reason::with_option(
                "Internet connections are blocked",
                options::BLOCK_INTERNET,
            )))
        }
        _ => None,
    }
}
