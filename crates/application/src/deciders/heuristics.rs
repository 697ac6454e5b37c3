use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{dga, fqdn, Connection, Reason, ResolvedProfile};

use super::Decision;

/// Domain heuristics: score the labels of the queried name with the
/// bigram plausibility model; implausible names are likely machine
/// generated. Very long sub-domain parts are additionally checked with a
/// laxer threshold to catch data-exfiltration tunnels.
pub(super) fn check_domain_heuristics(
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    if !profile.domain_heuristics {
        return None;
    }
    let domain = conn.entity.domain.as_ref()?;
    let etld1 = fqdn::etld_plus_one(domain)?;

    // Score everything in front of the public suffix.
    let labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
    let suffix_labels = etld1.trim_end_matches('.').split('.').count() - 1;
    let head = &labels[..labels.len().saturating_sub(suffix_labels)];
    let score = dga::worst_label_score(head.iter().copied());
    if score < dga::DGA_THRESHOLD {
        debug!(domain = %domain, score, "Domain failed plausibility check");
        return Some(Decision::Denied(Reason::with_option(
            format!("possible DGA domain (score {score:.1})"),
            options::DOMAIN_HEURISTICS,
        )));
    }

    // Exfiltration tunnels pad the name far beyond the eTLD+1.
    if domain.len() >= etld1.len() + dga::TUNNEL_LENGTH_EXCESS {
        if let Some(subdomain) = fqdn::subdomain_of(domain) {
            let score = dga::plausibility_score(&subdomain);
            if score < dga::TUNNEL_THRESHOLD {
                debug!(domain = %domain, score, "Sub-domain failed tunnel check");
                return Some(Decision::Denied(Reason::with_option(
                    format!("possible DNS data tunnel (score {score:.1})"),
                    options::DOMAIN_HEURISTICS,
                )));
            }
        }
    }

    None
}
