use vigil_domain::config::options;
use vigil_domain::{Connection, Reason, ResolverScope, ScopeBand};

use super::Decision;

/// DNS horizon guard: a destination IP that was resolved by a resolver
/// whose own scope could not legitimately know it is a spoofing vector.
/// A global resolver may not steer traffic to LAN or localhost; a LAN
/// resolver may not steer traffic to localhost.
pub(super) fn check_dns_horizon(conn: &mut Connection) -> Option<Decision> {
    let resolver = conn.resolver_info.as_ref()?;
    let band = conn.entity.ip_scope().band();

    let violation = match resolver.scope {
        ResolverScope::Global => matches!(band, ScopeBand::Lan | ScopeBand::Localhost),
        ResolverScope::Lan => band == ScopeBand::Localhost,
        ResolverScope::Localhost => false,
    };

    if violation {
        return Some(Decision::Denied(Reason::with_option(
            format!(
                "DNS horizon violation: {} resolver {} returned a {} address",
                scope_name(resolver.scope),
                resolver.name,
                band.as_str()
            ),
            options::REMOVE_OUT_OF_SCOPE_DNS,
        )));
    }
    None
}

fn scope_name(scope: ResolverScope) -> &'static str {
    match scope {
        ResolverScope::Global => "global",
        ResolverScope::Lan => "LAN",
        ResolverScope::Localhost => "localhost",
    }
}
