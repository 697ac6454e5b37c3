use tracing::debug;

use vigil_domain::{Connection, Reason};

use super::{Decision, FilterDeps};

/// Connections made by the firewall itself are accepted and flagged
/// internal so they are exempt from re-evaluation.
pub(super) fn check_own_process(deps: &FilterDeps, conn: &mut Connection) -> Option<Decision> {
    let pid = conn.pid()?;
    if pid != deps.own_pid {
        return None;
    }
    let remote_is_local = conn
        .entity
        .ip
        .map(|ip| deps.netenv.is_local_ip(ip))
        .unwrap_or(false);
    if !conn.direction.is_inbound() || remote_is_local {
        conn.internal = true;
        return Some(Decision::Allowed(Reason::new("connection by Vigil itself")));
    }
    None
}

/// Inbound replies to our own multicast/broadcast queries: scan the live
/// IP-connection table for an outbound query matching on protocol, local
/// port, local IP and process whose remote was the local multicast scope
/// or a directed broadcast.
pub(super) fn check_broadcast_reply(deps: &FilterDeps, conn: &mut Connection) -> Option<Decision> {
    if !conn.direction.is_inbound() {
        return None;
    }
    let pid = conn.pid()?;

    let query_remote =
        deps.connections
            .find_broadcast_query(conn.protocol, conn.local_ip, conn.local_port, pid)?;

    debug!(conn = %conn.id, query_remote = %query_remote, "Matched broadcast query");
    Some(Decision::Allowed(Reason::new(format!(
        "reply to broadcast/multicast query to {query_remote}"
    ))))
}
