mod helpers;

use helpers::mock_ports::{layered_profile, TestEnv, SYSTEM_RESOLVER_PID};
use std::net::IpAddr;

use vigil_application::Decision;
use vigil_domain::config::options;
use vigil_domain::{
    Connection, DefaultAction, Direction, IpProtocol, IpVersion, PacketInfo, ProcessContext,
    ProfileSettings, ResolverInfo, ResolverScope,
};

fn packet(protocol: IpProtocol, remote: &str, remote_port: u16) -> PacketInfo {
    PacketInfo {
        direction: Direction::Outbound,
        version: IpVersion::V4,
        protocol,
        local_ip: "10.0.0.2".parse::<IpAddr>().unwrap(),
        local_port: 50_000,
        remote_ip: remote.parse().unwrap(),
        remote_port,
        pid: Some(1217),
        fast_tracked: false,
        info_only: false,
        payload: None,
        icmp: None,
    }
}

fn attributed(mut conn: Connection, pid: u32) -> Connection {
    conn.process_ctx = Some(ProcessContext {
        pid,
        name: "curl".to_string(),
        path: "/usr/bin/curl".to_string(),
        cmdline: "curl https://example.com".to_string(),
        profile_id: "app-profile".to_string(),
        profile_source: "local".to_string(),
        primary_profile_id: "local/app-profile".to_string(),
    });
    conn
}

fn option_key(decision: &Decision) -> Option<String> {
    match decision {
        Decision::Allowed(r) | Decision::Denied(r) | Decision::RerouteToTunnel(r) => {
            r.option_key.clone()
        }
        Decision::NoMatch => None,
    }
}

// ============================================================================
// Default action
// ============================================================================

#[tokio::test]
async fn test_default_permit_for_plain_https() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
    assert_eq!(option_key(&decision).as_deref(), Some(options::DEFAULT_ACTION));
}

#[tokio::test]
async fn test_default_block() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Block),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
    assert_eq!(option_key(&decision).as_deref(), Some(options::DEFAULT_ACTION));
}

#[tokio::test]
async fn test_ask_prompts_and_denies_on_dismissal() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Ask),
            auto_permit: Some(false),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
    assert_eq!(env.notifier.prompts.lock().unwrap().len(), 1);
    // The notifier concluded (dismissal), so no prompt is pending.
    assert!(conn.prompt_id.is_none());
}

#[tokio::test]
async fn test_unanswered_prompt_keeps_cancellation_handle() {
    let env = TestEnv::new();
    env.notifier.set_hang(true);
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Ask),
            auto_permit: Some(false),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");

    // The prompt timed out and may still be on screen: the handle stays
    // on the connection so re-evaluation can cancel it.
    let prompt_id = conn.prompt_id.clone().expect("pending prompt handle");
    assert!(prompt_id.starts_with("filter:prompt-"), "{prompt_id}");

    env.prompts.cancel_for(&conn).await;
    assert_eq!(env.notifier.cancelled.lock().unwrap().as_slice(), [prompt_id]);
}

// ============================================================================
// Own process & broadcast replies
// ============================================================================

#[tokio::test]
async fn test_own_process_is_internal() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Block),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "9.9.9.9", 853)),
        helpers::mock_ports::OWN_PID,
    );

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
    assert!(conn.internal);
}

#[tokio::test]
async fn test_broadcast_reply_is_allowed() {
    let env = TestEnv::new();
    env.connections.set_broadcast_query("255.255.255.255");
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    // Inbound UDP reply on the port of a prior outbound broadcast query.
    let mut pkt = packet(IpProtocol::Udp, "192.168.1.23", 40_672);
    pkt.direction = Direction::Inbound;
    pkt.local_port = 29_810;
    let mut conn = attributed(Connection::from_packet(&pkt), 1217);

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    match &decision {
        Decision::Allowed(reason) => {
            assert!(reason.message.contains("broadcast"), "{}", reason.message)
        }
        other => panic!("expected allow, got {other:?}"),
    }
}

#[tokio::test]
async fn test_inbound_without_query_is_blocked() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut pkt = packet(IpProtocol::Udp, "192.168.1.23", 40_672);
    pkt.direction = Direction::Inbound;
    let mut conn = attributed(Connection::from_packet(&pkt), 1217);

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
    assert_eq!(option_key(&decision).as_deref(), Some(options::BLOCK_INBOUND));
}

// ============================================================================
// Connection-type & scope policy
// ============================================================================

#[tokio::test]
async fn test_stun_is_blocked_with_p2p_policy() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            block_p2p: Some(true),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Udp, "3.3.3.3", 3478)),
        1217,
    );
    conn.entity.set_domain("stun.example.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(option_key(&decision).as_deref(), Some(options::BLOCK_P2P));
}

#[tokio::test]
async fn test_direct_ip_without_dns_is_blocked_with_p2p_policy() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            block_p2p: Some(true),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    // No domain on the entity: nothing resolved this address.
    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "5.6.7.8", 4444)),
        1217,
    );

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(option_key(&decision).as_deref(), Some(options::BLOCK_P2P));
}

#[tokio::test]
async fn test_scope_policy_blocks_internet() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            block_scope_internet: Some(true),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(option_key(&decision).as_deref(), Some(options::BLOCK_INTERNET));

    // LAN stays reachable under the same profile.
    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "10.0.0.7", 443)),
        1217,
    );
    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
}

// ============================================================================
// Endpoint lists
// ============================================================================

#[tokio::test]
async fn test_endpoint_rules_first_match_wins() {
    use vigil_domain::EndpointRule;

    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            endpoints: Some(vec![
                EndpointRule::parse("+ example.com.").unwrap(),
                EndpointRule::parse("- *").unwrap(),
            ]),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "93.184.216.34", 443)),
        1217,
    );
    conn.entity.set_domain("example.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
    assert_eq!(option_key(&decision).as_deref(), Some(options::ENDPOINTS));

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "93.184.216.34", 443)),
        1217,
    );
    conn.entity.set_domain("other.example.org");
    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
}

#[tokio::test]
async fn test_system_resolver_dns_requests_skip_global_rules() {
    let env = TestEnv::new();
    let chain = env.chain();
    // The global layer denies everything; the local layer has no rules.
    let profile = layered_profile(
        ProfileSettings::default(),
        ProfileSettings {
            endpoints: Some(vec![vigil_domain::EndpointRule::parse("- *").unwrap()]),
            ..Default::default()
        },
    );

    let mut conn = Connection::new_dns_request("example.com.", None);
    conn = attributed(conn, SYSTEM_RESOLVER_PID);

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    // Falls through to the default action instead of the global deny-all.
    assert_eq!(option_key(&decision).as_deref(), Some(options::DEFAULT_ACTION));
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");

    // A normal process is still caught by the global rule.
    let mut conn = attributed(Connection::new_dns_request("example.com.", None), 1217);
    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
}

// ============================================================================
// Resolver horizon & bypass prevention
// ============================================================================

#[tokio::test]
async fn test_dns_horizon_violation_blocks() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "192.168.1.10", 443)),
        1217,
    );
    conn.entity.set_domain("internal.example.com");
    conn.resolver_info = Some(ResolverInfo {
        name: "quad9".to_string(),
        kind: "dot".to_string(),
        source: "config".to_string(),
        ip: Some("9.9.9.9".parse().unwrap()),
        scope: ResolverScope::Global,
    });

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(
        option_key(&decision).as_deref(),
        Some(options::REMOVE_OUT_OF_SCOPE_DNS)
    );
}

#[tokio::test]
async fn test_doh_canary_is_denied() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut conn = attributed(
        Connection::new_dns_request("use-application-dns.net.", None),
        1217,
    );

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
    assert_eq!(
        option_key(&decision).as_deref(),
        Some(options::PREVENT_BYPASSING)
    );
}

#[tokio::test]
async fn test_direct_dns_blocked_except_for_system_resolver() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Udp, "8.8.8.8", 53)),
        1217,
    );
    conn.entity.set_domain("dns.google");
    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(
        option_key(&decision).as_deref(),
        Some(options::PREVENT_BYPASSING)
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Udp, "8.8.8.8", 53)),
        SYSTEM_RESOLVER_PID,
    );
    conn.entity.set_domain("dns.google");
    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
}

#[tokio::test]
async fn test_disabled_resolver_marks_dns_for_inspection() {
    let env = TestEnv::new();
    env.resolver.set_disabled(true);
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Udp, "8.8.8.8", 53)),
        SYSTEM_RESOLVER_PID,
    );
    conn.entity.set_domain("dns.google");
    let _ = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(conn.inspecting);
}

// ============================================================================
// Filter lists, heuristics, custom lists, auto-permit
// ============================================================================

#[tokio::test]
async fn test_filter_list_match_denies() {
    let env = TestEnv::new();
    env.lists.add_domain("ads.example.com.", &["ADS"]);
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            filter_lists: Some(vec!["ADS".to_string()]),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "93.184.216.34", 443)),
        1217,
    );
    conn.entity.set_domain("ads.example.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(option_key(&decision).as_deref(), Some(options::FILTER_LISTS));
}

#[tokio::test]
async fn test_unbreak_list_overrides_block() {
    let env = TestEnv::new();
    env.lists.add_domain("cdn.example.com.", &["ADS", "UNBREAK"]);
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            filter_lists: Some(vec!["ADS".to_string()]),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "93.184.216.34", 443)),
        1217,
    );
    conn.entity.set_domain("cdn.example.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
}

#[tokio::test]
async fn test_dga_domain_is_blocked() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            domain_heuristics: Some(true),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "6.6.6.6", 443)),
        1217,
    );
    conn.entity.set_domain("asdfqwzxncvbqpwoeiruty.example.com.");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
    assert_eq!(
        option_key(&decision).as_deref(),
        Some(options::DOMAIN_HEURISTICS)
    );

    // A plausible domain passes under the same profile.
    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "93.184.216.34", 443)),
        1217,
    );
    conn.entity.set_domain("downloads.example.com.");
    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
}

#[tokio::test]
async fn test_custom_filter_list_denies_parent_zone() {
    use std::collections::HashSet;
    use vigil_domain::CustomFilterList;

    let env = TestEnv::new();
    let chain = env.chain();
    let mut domains = HashSet::new();
    domains.insert("example.com.".to_string());
    let profile = layered_profile(
        ProfileSettings {
            custom_filter: Some(CustomFilterList {
                domains,
                ..Default::default()
            }),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "93.184.216.34", 443)),
        1217,
    );
    conn.entity.set_domain("deep.sub.example.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert_eq!(
        option_key(&decision).as_deref(),
        Some(options::CUSTOM_FILTER_LIST)
    );
}

#[tokio::test]
async fn test_auto_permit_related_domain() {
    let env = TestEnv::new();
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Ask),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "35.186.224.25", 443)),
        1217,
    );
    conn.process_ctx.as_mut().unwrap().name = "spotify".to_string();
    conn.process_ctx.as_mut().unwrap().path = "/usr/bin/spotify".to_string();
    conn.entity.set_domain("api.spotify.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
    assert_eq!(option_key(&decision).as_deref(), Some(options::AUTO_PERMIT));
    // No prompt was raised.
    assert!(env.notifier.prompts.lock().unwrap().is_empty());
}

// ============================================================================
// Portal grace & tunnel routing
// ============================================================================

#[tokio::test]
async fn test_portal_grace_for_connectivity_domain() {
    let env = TestEnv::new();
    env.netenv.set_status(vigil_domain::OnlineStatus::Portal);
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Block),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "34.107.221.82", 80)),
        1217,
    );
    conn.entity.set_domain("detectportal.firefox.com");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Allowed(_)), "{decision:?}");
    assert_eq!(
        option_key(&decision).as_deref(),
        Some(options::CONNECTIVITY_DOMAINS)
    );
}

#[tokio::test]
async fn test_tunnel_reroutes_accepted_internet_traffic() {
    let env = TestEnv::new();
    env.tunnel.set_connected(true);
    let chain = env.chain();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::RerouteToTunnel(_)), "{decision:?}");
}

#[tokio::test]
async fn test_deny_beats_tunnel_reroute() {
    let env = TestEnv::new();
    env.tunnel.set_connected(true);
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Block),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(
        Connection::from_packet(&packet(IpProtocol::Tcp, "1.1.1.1", 443)),
        1217,
    );
    conn.entity.set_domain("one.one.one.one");

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
}

// ============================================================================
// CNAME chain filtering
// ============================================================================

#[tokio::test]
async fn test_cname_chain_block() {
    let env = TestEnv::new();
    env.lists.add_domain("tracker.example.net.", &["ADS"]);
    let chain = env.chain();
    let profile = layered_profile(
        ProfileSettings {
            cname_filtering: Some(true),
            filter_lists: Some(vec!["ADS".to_string()]),
            ..Default::default()
        },
        ProfileSettings::default(),
    );

    let mut conn = attributed(Connection::new_dns_request("shop.example.com.", None), 1217);
    conn.entity.cnames = vec!["tracker.example.net.".to_string()];

    let decision = chain.decide(&mut conn, &profile.lock_for_usage()).await;
    assert!(matches!(decision, Decision::Denied(_)), "{decision:?}");
    assert_eq!(option_key(&decision).as_deref(), Some(options::FILTER_LISTS));
}
