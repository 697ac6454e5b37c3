use std::net::IpAddr;
use tracing::debug;

use vigil_domain::config::options;
use vigil_domain::{IpScope, ResolvedProfile, ResolverScope, RrCache, RrEntry, ScopeBand};

/// Result of sanitising one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizeOutcome {
    Unchanged,
    /// Some records were removed but addresses remain.
    Filtered,
    /// Every A/AAAA record was removed; the enclosing DNS request must be
    /// blocked with the driving option as the reason.
    AllAddressesRemoved { option_key: &'static str },
}

fn record_ip(rr: &RrEntry) -> Option<IpAddr> {
    match rr.rtype.as_str() {
        "A" | "AAAA" => rr.rdata.parse().ok(),
        _ => None,
    }
}

/// Why a record has to go, if it does.
fn removal_reason(
    ip: IpAddr,
    resolver_scope: ResolverScope,
    profile: &ResolvedProfile,
) -> Option<&'static str> {
    let band = IpScope::classify(ip).band();

    // A resolver may not answer with addresses outside its own horizon: a
    // global resolver returning LAN or localhost addresses (or a LAN
    // resolver returning localhost) is a spoofing vector.
    if profile.remove_out_of_scope_dns {
        let out_of_scope = match resolver_scope {
            ResolverScope::Global => {
                matches!(band, ScopeBand::Lan | ScopeBand::Localhost)
            }
            ResolverScope::Lan => band == ScopeBand::Localhost,
            ResolverScope::Localhost => false,
        };
        if out_of_scope {
            return Some(options::REMOVE_OUT_OF_SCOPE_DNS);
        }
    }

    if profile.remove_blocked_dns {
        let blocked = match band {
            ScopeBand::Internet => profile.block_scope_internet,
            ScopeBand::Lan => profile.block_scope_lan,
            ScopeBand::Localhost => profile.block_scope_local,
            ScopeBand::Invalid => true,
        };
        if blocked {
            return Some(options::REMOVE_BLOCKED_DNS);
        }
    }

    None
}

/// Sanitise a response per profile: remove answer records that violate the
/// resolver's scope horizon or the profile's blocked scopes. The
/// firewall's own internal resolver traffic is never filtered.
pub fn sanitize_response(
    cache: &mut RrCache,
    profile: &ResolvedProfile,
    internal: bool,
) -> SanitizeOutcome {
    if internal {
        return SanitizeOutcome::Unchanged;
    }

    let address_count = cache
        .answers
        .iter()
        .filter(|rr| record_ip(rr).is_some())
        .count();

    let mut removed = Vec::new();
    let mut last_option: Option<&'static str> = None;
    let resolver_scope = cache.resolver.scope;

    cache.answers.retain(|rr| match record_ip(rr) {
        Some(ip) => match removal_reason(ip, resolver_scope, profile) {
            Some(option_key) => {
                removed.push(rr.clone());
                last_option = Some(option_key);
                false
            }
            None => true,
        },
        None => true,
    });

    if removed.is_empty() {
        return SanitizeOutcome::Unchanged;
    }

    for rr in &removed {
        debug!(record = %rr.to_line(), "Removed DNS answer during sanitisation");
        cache.mark_filtered(rr);
    }

    let remaining = cache
        .answers
        .iter()
        .filter(|rr| record_ip(rr).is_some())
        .count();

    if remaining == 0 && address_count > 0 {
        SanitizeOutcome::AllAddressesRemoved {
            option_key: last_option.unwrap_or(options::REMOVE_OUT_OF_SCOPE_DNS),
        }
    } else {
        SanitizeOutcome::Filtered
    }
}
