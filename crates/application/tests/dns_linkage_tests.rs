use std::sync::Arc;

use vigil_application::dns::sanitise::{sanitize_response, SanitizeOutcome};
use vigil_application::{DnsLinkage, GLOBAL_SCOPE};
use vigil_domain::config::options;
use vigil_domain::{
    LayeredProfile, Profile, ProfileSettings, ResolverInfo, ResolverScope, RrCache, RrEntry,
};

fn resolver(scope: ResolverScope) -> ResolverInfo {
    ResolverInfo {
        name: "upstream".to_string(),
        kind: "dot".to_string(),
        source: "config".to_string(),
        ip: Some("9.9.9.9".parse().unwrap()),
        scope,
    }
}

fn response(domain: &str, scope: ResolverScope, answers: Vec<RrEntry>) -> RrCache {
    let mut cache = RrCache::new(domain, "A", resolver(scope));
    cache.answers = answers;
    cache.clean(120);
    cache
}

fn resolved_profile(settings: ProfileSettings) -> vigil_domain::ResolvedProfile {
    let local = Arc::new(Profile::new("local", "p", "P").with_settings(settings));
    let global = Arc::new(Profile::new("special", "global", "G"));
    LayeredProfile::new(local, global).lock_for_usage().clone()
}

// ============================================================================
// Sanitisation
// ============================================================================

#[test]
fn test_global_resolver_may_not_return_lan_addresses() {
    let mut cache = response(
        "internal.example.com.",
        ResolverScope::Global,
        vec![RrEntry::new("internal.example.com.", 300, "A", "192.168.1.10")],
    );
    let profile = resolved_profile(ProfileSettings::default());

    let outcome = sanitize_response(&mut cache, &profile, false);
    assert_eq!(
        outcome,
        SanitizeOutcome::AllAddressesRemoved {
            option_key: options::REMOVE_OUT_OF_SCOPE_DNS
        }
    );
    assert!(cache.answers.is_empty());
    assert!(cache.filtered);
    assert_eq!(cache.filtered_entries.len(), 1);
}

#[test]
fn test_partial_removal_keeps_remaining_addresses() {
    let mut cache = response(
        "mixed.example.com.",
        ResolverScope::Global,
        vec![
            RrEntry::new("mixed.example.com.", 300, "A", "93.184.216.34"),
            RrEntry::new("mixed.example.com.", 300, "A", "10.13.13.13"),
        ],
    );
    let profile = resolved_profile(ProfileSettings::default());

    let outcome = sanitize_response(&mut cache, &profile, false);
    assert_eq!(outcome, SanitizeOutcome::Filtered);
    assert_eq!(cache.answers.len(), 1);
    assert_eq!(cache.answers[0].rdata, "93.184.216.34");
}

#[test]
fn test_lan_resolver_may_return_lan_but_not_localhost() {
    let profile = resolved_profile(ProfileSettings::default());

    let mut cache = response(
        "router.lan.",
        ResolverScope::Lan,
        vec![RrEntry::new("router.lan.", 300, "A", "192.168.1.1")],
    );
    assert_eq!(
        sanitize_response(&mut cache, &profile, false),
        SanitizeOutcome::Unchanged
    );

    let mut cache = response(
        "evil.lan.",
        ResolverScope::Lan,
        vec![RrEntry::new("evil.lan.", 300, "A", "127.0.0.1")],
    );
    assert!(matches!(
        sanitize_response(&mut cache, &profile, false),
        SanitizeOutcome::AllAddressesRemoved { .. }
    ));
}

#[test]
fn test_blocked_scope_removal() {
    let mut cache = response(
        "example.com.",
        ResolverScope::Global,
        vec![RrEntry::new("example.com.", 300, "A", "93.184.216.34")],
    );
    let profile = resolved_profile(ProfileSettings {
        block_scope_internet: Some(true),
        ..Default::default()
    });

    let outcome = sanitize_response(&mut cache, &profile, false);
    assert_eq!(
        outcome,
        SanitizeOutcome::AllAddressesRemoved {
            option_key: options::REMOVE_BLOCKED_DNS
        }
    );
}

#[test]
fn test_internal_traffic_is_never_filtered() {
    let mut cache = response(
        "internal.example.com.",
        ResolverScope::Global,
        vec![RrEntry::new("internal.example.com.", 300, "A", "192.168.1.10")],
    );
    let profile = resolved_profile(ProfileSettings::default());

    assert_eq!(
        sanitize_response(&mut cache, &profile, true),
        SanitizeOutcome::Unchanged
    );
    assert_eq!(cache.answers.len(), 1);
}

#[test]
fn test_disabling_out_of_scope_removal() {
    let mut cache = response(
        "internal.example.com.",
        ResolverScope::Global,
        vec![RrEntry::new("internal.example.com.", 300, "A", "192.168.1.10")],
    );
    let profile = resolved_profile(ProfileSettings {
        remove_out_of_scope_dns: Some(false),
        ..Default::default()
    });

    assert_eq!(
        sanitize_response(&mut cache, &profile, false),
        SanitizeOutcome::Unchanged
    );
}

// ============================================================================
// IP→domain linkage
// ============================================================================

#[tokio::test]
async fn test_linkage_scoping() {
    let linkage = DnsLinkage::new(None);
    let cache = response(
        "example.com.",
        ResolverScope::Global,
        vec![RrEntry::new("example.com.", 300, "A", "93.184.216.34")],
    );

    // Attributed request: stored under the profile scope.
    linkage.observe_response(&cache, Some("local/app")).await;
    let ip = "93.184.216.34".parse().unwrap();

    let hit = linkage.lookup("local/app", ip).unwrap();
    assert_eq!(hit.domain, "example.com.");

    // Another profile cannot see it...
    assert!(linkage.lookup("local/other", ip).is_none());

    // ...until the system resolver observes it under the global sentinel.
    linkage.observe_response(&cache, None).await;
    let hit = linkage.lookup("local/other", ip).unwrap();
    assert_eq!(hit.domain, "example.com.");
    assert!(linkage.lookup(GLOBAL_SCOPE, ip).is_some());
}

#[tokio::test]
async fn test_linkage_follows_cname_chains() {
    let linkage = DnsLinkage::new(None);
    let mut cache = RrCache::new("www.example.com.", "A", resolver(ResolverScope::Global));
    cache.answers = vec![
        RrEntry::new("www.example.com.", 300, "CNAME", "edge.cdn.example.net."),
        RrEntry::new("edge.cdn.example.net.", 300, "CNAME", "pop.cdn.example.net."),
        RrEntry::new("pop.cdn.example.net.", 300, "A", "151.101.1.1"),
    ];
    cache.clean(120);

    linkage.observe_response(&cache, None).await;
    let hit = linkage
        .lookup(GLOBAL_SCOPE, "151.101.1.1".parse().unwrap())
        .unwrap();
    assert_eq!(hit.domain, "www.example.com.");
    assert_eq!(
        hit.cnames,
        vec![
            "edge.cdn.example.net.".to_string(),
            "pop.cdn.example.net.".to_string()
        ]
    );
}

#[tokio::test]
async fn test_linkage_parses_https_hints() {
    let linkage = DnsLinkage::new(None);
    let mut cache = RrCache::new("svc.example.com.", "HTTPS", resolver(ResolverScope::Global));
    cache.answers = vec![RrEntry::new(
        "svc.example.com.",
        300,
        "HTTPS",
        "1 . alpn=h2 ipv4hint=198.51.100.7,198.51.100.8",
    )];
    cache.clean(120);

    linkage.observe_response(&cache, None).await;
    assert!(linkage
        .lookup(GLOBAL_SCOPE, "198.51.100.7".parse().unwrap())
        .is_some());
    assert!(linkage
        .lookup(GLOBAL_SCOPE, "198.51.100.8".parse().unwrap())
        .is_some());
}

#[tokio::test]
async fn test_linkage_skips_localhost_addresses() {
    let linkage = DnsLinkage::new(None);
    let cache = response(
        "local.example.com.",
        ResolverScope::Localhost,
        vec![RrEntry::new("local.example.com.", 300, "A", "127.0.0.1")],
    );
    linkage.observe_response(&cache, None).await;
    assert!(linkage.is_empty());
}

#[tokio::test]
async fn test_linkage_reobservation_refreshes_instead_of_stacking() {
    let linkage = DnsLinkage::new(None);
    let cache = response(
        "example.com.",
        ResolverScope::Global,
        vec![RrEntry::new("example.com.", 300, "A", "93.184.216.34")],
    );
    linkage.observe_response(&cache, None).await;
    linkage.observe_response(&cache, None).await;
    assert_eq!(linkage.len(), 1);
}
