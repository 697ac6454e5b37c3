use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{similarity, Connection, DefaultAction, Reason, ResolvedProfile};

use super::Decision;

const SIMILARITY_THRESHOLD: f64 = 0.5;

/// Auto-permit related domains: when the profile would otherwise ask or
/// block, a domain label that closely resembles the process identity
/// (path tail, name, executable) is taken as "this app talking to its own
/// service" and permitted.
pub(super) fn check_auto_permit(
    conn: &mut Connection,
    profile: &ResolvedProfile,
) -> Option<Decision> {
    if profile.default_action == DefaultAction::Permit || !profile.auto_permit {
        return None;
    }
    let domain = conn.entity.domain.as_ref()?;
    let ctx = conn.process_ctx.as_ref()?;

    let mut references: Vec<String> = Vec::new();
    let path_segments: Vec<&str> = ctx.path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    references.extend(
        path_segments
            .iter()
            .rev()
            .take(2)
            .map(|s| s.to_ascii_lowercase()),
    );
    references.push(ctx.name.to_ascii_lowercase());
    if let Some(exec) = path_segments.last() {
        references.push(
            exec.trim_end_matches(".exe")
                .trim_end_matches(".bin")
                .to_ascii_lowercase(),
        );
    }

    for label in domain.trim_end_matches('.').split('.') {
        if label.len() < 4 {
            continue;
        }
        for reference in &references {
            let score = similarity::similarity(label, reference);
            if score > SIMILARITY_THRESHOLD {
                debug!(label, reference = %reference, score, "Auto-permitting related domain");
                return Some(Decision::Allowed(Reason::with_option(
                    format!("domain {label:?} is related to process {:?}", ctx.name),
                    options::AUTO_PERMIT,
                )));
            }
        }
    }
    None
}
