use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{Connection, Reason};

use super::{Decision, FilterDeps};

/// Captive-portal grace: while the environment reports portal state,
/// outbound connections to the configured connectivity-check domains are
/// accepted so the host can bootstrap its way out.
pub(super) fn check_portal_grace(deps: &FilterDeps, conn: &mut Connection) -> Option<Decision> {
    if conn.direction.is_inbound() || !deps.netenv.online_status().is_portal() {
        return None;
    }
    let domain = conn.entity.domain.as_ref()?;
    if deps
        .config
        .connectivity_domains
        .iter()
        .any(|d| d == domain)
    {
        debug!(domain = %domain, "Granting captive-portal grace");
        return Some(Decision::Allowed(Reason::with_option(
            "connectivity-check domain allowed during captive portal",
            options::CONNECTIVITY_DOMAINS,
        )));
    }
    None
}
