use std::collections::BTreeMap;
use std::fmt::Write as _;

use vigil_domain::{Condition, Connection, CoreError, Record};

use crate::ports::ConnectionsViewPort;

/// Parameters of the cross-cutting connection dump: an optional profile
/// scope (`source/id`) and an optional parsed `where` condition.
#[derive(Debug, Default)]
pub struct DebugDumpRequest {
    pub profile: Option<String>,
    pub filter: Option<Condition>,
}

/// Render a per-process grouped dump of live connections with a fixed
/// column layout. Drives the debug-info endpoint; the textual condition
/// comes from the query language parser.
pub fn debug_dump(
    connections: &dyn ConnectionsViewPort,
    request: &DebugDumpRequest,
) -> Result<String, CoreError> {
    if let Some(cond) = &request.filter {
        cond.check()?;
    }

    let mut grouped: BTreeMap<String, Vec<Connection>> = BTreeMap::new();
    for conn in connections.snapshot() {
        if let Some(profile) = &request.profile {
            if conn.profile_scope().as_deref() != Some(profile.as_str()) {
                continue;
            }
        }
        if let Some(cond) = &request.filter {
            let mut record = Record::from_value("network", &conn.id, &conn)?;
            if !cond.matches(&record.accessor()) {
                continue;
            }
        }

        let group = conn
            .process_ctx
            .as_ref()
            .map(|p| format!("{} (pid {})", p.name, p.pid))
            .unwrap_or_else(|| "unattributed".to_string());
        grouped.entry(group).or_default().push(conn);
    }

    let mut out = String::new();
    for (process, mut conns) in grouped {
        conns.sort_by(|a, b| a.started.cmp(&b.started));
        let _ = writeln!(out, "{process}:");
        let _ = writeln!(
            out,
            "  {:<44} {:<9} {:<22} {:<8} reason",
            "connection", "direction", "verdict", "ended"
        );
        for conn in conns {
            let direction = if conn.direction.is_inbound() { "inbound" } else { "outbound" };
            let _ = writeln!(
                out,
                "  {:<44} {:<9} {:<22} {:<8} {}",
                conn.id,
                direction,
                conn.verdict.as_str(),
                if conn.has_ended() { "yes" } else { "no" },
                conn.reason.message
            );
        }
        out.push('\n');
    }
    Ok(out)
}
