mod helpers;

use helpers::{layered_profile, make_process, PipelineEnv, OWN_PID, SYSTEM_RESOLVER_PID};
use std::net::IpAddr;
use std::sync::Arc;

use vigil_domain::config::options;
use vigil_domain::{
    DefaultAction, Direction, HandlerStage, IpProtocol, IpVersion, PacketAction, PacketInfo,
    ProfileSettings, Verdict,
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

fn register_default_process(env: &PipelineEnv, pid: u32) {
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());
    env.process_lookup
        .add_process(make_process(pid, "/usr/bin/curl", "curl", profile));
}

// ============================================================================
// Scenario: outbound HTTPS under default permit
// ============================================================================

#[tokio::test]
async fn test_outbound_https_default_permit() {
    let env = PipelineEnv::new();
    register_default_process(&env, 1217);

    let pkt = packet(IpProtocol::Tcp, "1.1.1.1", 443);
    env.deliver(&pkt).await;

    assert_eq!(env.sink.last_action(), Some(PacketAction::PermanentAccept));

    let conn = env.store.get(&pkt.connection_id()).unwrap();
    let conn = conn.lock().await;
    assert_eq!(conn.verdict, Verdict::Accept);
    assert!(conn.verdict_permanent);
    assert_eq!(
        conn.reason.option_key.as_deref(),
        Some(options::DEFAULT_ACTION)
    );
    assert_eq!(conn.handler, HandlerStage::Done);
}

#[tokio::test]
async fn test_connection_is_persisted() {
    let env = PipelineEnv::new();
    register_default_process(&env, 1217);

    let pkt = packet(IpProtocol::Tcp, "1.1.1.1", 443);
    env.deliver(&pkt).await;

    use vigil_application::ports::StorageInterface;
    use vigil_domain::RecordKey;
    let key = RecordKey::new("network", format!("tree/1217/{}", pkt.connection_id()));
    let record = env.storage.get(&key).await.unwrap();
    let stored: vigil_domain::Connection = record.parse_body().unwrap();
    assert_eq!(stored.verdict, Verdict::Accept);
}

// ============================================================================
// Fast-track rules
// ============================================================================

#[tokio::test]
async fn test_capture_layer_fast_track_flag() {
    let env = PipelineEnv::new();
    let mut pkt = packet(IpProtocol::Tcp, "93.184.216.34", 80);
    pkt.fast_tracked = true;
    env.deliver(&pkt).await;
    assert_eq!(env.sink.last_action(), Some(PacketAction::PermanentAccept));
}

#[tokio::test]
async fn test_icmp_control_traffic_stays_observable() {
    let env = PipelineEnv::new();
    let mut pkt = packet(IpProtocol::Icmp, "1.1.1.1", 0);
    pkt.icmp = Some((3, 0)); // destination unreachable
    env.deliver(&pkt).await;

    // Ephemeral accept: future packets still reach the handler.
    assert_eq!(env.sink.last_action(), Some(PacketAction::Accept));
    let conn = env.store.get(&pkt.connection_id()).unwrap();
    assert_eq!(conn.lock().await.handler, HandlerStage::FastTrack);
}

#[tokio::test]
async fn test_dhcp_is_accepted_permanently() {
    let env = PipelineEnv::new();
    let mut pkt = packet(IpProtocol::Udp, "255.255.255.255", 67);
    pkt.local_port = 68;
    env.deliver(&pkt).await;
    assert_eq!(env.sink.last_action(), Some(PacketAction::PermanentAccept));
}

#[tokio::test]
async fn test_local_nameserver_permanence_depends_on_pid() {
    let env = PipelineEnv::new();

    // PID known: permanent.
    let pkt = packet(IpProtocol::Udp, "127.0.0.53", 53);
    env.deliver(&pkt).await;
    assert_eq!(env.sink.last_action(), Some(PacketAction::PermanentAccept));

    // PID unknown: ephemeral accept, the flow re-enters fast-track.
    let mut pkt = packet(IpProtocol::Tcp, "127.0.0.53", 53);
    pkt.pid = None;
    env.deliver(&pkt).await;
    assert_eq!(env.sink.last_action(), Some(PacketAction::Accept));
    let conn = env.store.get(&pkt.connection_id()).unwrap();
    assert_eq!(conn.lock().await.handler, HandlerStage::FastTrack);
}

// ============================================================================
// Scenario: broadcast reply matching
// ============================================================================

#[tokio::test]
async fn test_broadcast_reply_is_allowed() {
    let env = PipelineEnv::new();
    register_default_process(&env, 1217);

    // Outbound discovery query to the limited broadcast address.
    let mut query = packet(IpProtocol::Udp, "255.255.255.255", 29_810);
    query.local_port = 29_810;
    env.deliver(&query).await;

    // Inbound reply from another host, same local port and process.
    let mut reply = packet(IpProtocol::Udp, "192.168.1.23", 40_672);
    reply.direction = Direction::Inbound;
    reply.local_port = 29_810;
    env.deliver(&reply).await;

    let conn = env.store.get(&reply.connection_id()).unwrap();
    let conn = conn.lock().await;
    assert_eq!(conn.verdict, Verdict::Accept);
    assert!(conn.reason.message.contains("broadcast"));
}

// ============================================================================
// Scenario: pre-authenticated local port
// ============================================================================

#[tokio::test]
async fn test_preauthenticated_port_is_consumed() {
    let env = PipelineEnv::new();
    let profile = layered_profile(
        ProfileSettings {
            default_action: Some(DefaultAction::Block),
            ..Default::default()
        },
        ProfileSettings::default(),
    );
    env.process_lookup
        .add_process(make_process(1217, "/usr/bin/curl", "curl", profile));

    let port = env.preauth.get_permitted_port(IpProtocol::Tcp);

    let mut pkt = packet(IpProtocol::Tcp, "52.1.2.3", 443);
    pkt.local_port = port;
    env.deliver(&pkt).await;

    let conn = env.store.get(&pkt.connection_id()).unwrap();
    {
        let conn = conn.lock().await;
        assert_eq!(conn.verdict, Verdict::Accept);
        assert!(conn.internal);
        assert_eq!(conn.reason.message, "connection by Vigil");
    }

    // The permit is consumed: a second flow on the same local port is
    // judged normally and hits the blocking default action.
    let mut second = packet(IpProtocol::Tcp, "52.9.9.9", 443);
    second.local_port = port;
    env.deliver(&second).await;

    let conn = env.store.get(&second.connection_id()).unwrap();
    let conn = conn.lock().await;
    assert_eq!(conn.verdict, Verdict::Block);
    assert!(!conn.internal);
}

// ============================================================================
// DNS interception and inspection
// ============================================================================

#[tokio::test]
async fn test_outbound_dns_is_rerouted_to_nameserver() {
    let env = PipelineEnv::new();
    register_default_process(&env, 1217);

    let pkt = packet(IpProtocol::Udp, "8.8.8.8", 53);
    env.deliver(&pkt).await;

    assert_eq!(
        env.sink.last_action(),
        Some(PacketAction::RerouteToNameserver)
    );
    let conn = env.store.get(&pkt.connection_id()).unwrap();
    let conn = conn.lock().await;
    assert_eq!(conn.verdict, Verdict::RerouteToNameserver);
    assert!(conn.internal);
}

fn dns_response_payload() -> Vec<u8> {
    use hickory_proto::op::{Message, MessageType, Query as DnsQuery};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};
    use std::str::FromStr;

    let name = Name::from_str("dns.google.").unwrap();
    let mut message = Message::new();
    message.set_message_type(MessageType::Response);
    message.add_query(DnsQuery::query(name.clone(), RecordType::A));
    message.add_answer(Record::from_rdata(name, 300, RData::A(A::new(8, 8, 8, 8))));
    message.to_vec().unwrap()
}

#[tokio::test]
async fn test_observed_dns_answers_feed_the_reverse_map() {
    let env = PipelineEnv::new();
    register_default_process(&env, SYSTEM_RESOLVER_PID);
    env.resolver.set_disabled(true);

    // First packet: the chain marks the flow for DNS inspection.
    let mut pkt = packet(IpProtocol::Udp, "8.8.8.8", 53);
    pkt.pid = Some(SYSTEM_RESOLVER_PID);
    env.deliver(&pkt).await;

    let conn = env.store.get(&pkt.connection_id()).unwrap();
    assert_eq!(conn.lock().await.handler, HandlerStage::InspectDnsPacket);

    // Second packet carries a response payload; its answers land in the
    // IP→domain map.
    let mut response = pkt.clone();
    response.payload = Some(dns_response_payload());
    env.deliver(&response).await;

    let resolved = env
        .linkage
        .lookup(vigil_application::GLOBAL_SCOPE, "8.8.8.8".parse().unwrap());
    assert_eq!(resolved.unwrap().domain, "dns.google.");
}

#[tokio::test]
async fn test_unparsable_dns_payload_blocks_flow() {
    let env = PipelineEnv::new();
    register_default_process(&env, SYSTEM_RESOLVER_PID);
    env.resolver.set_disabled(true);

    let mut pkt = packet(IpProtocol::Udp, "8.8.8.8", 53);
    pkt.pid = Some(SYSTEM_RESOLVER_PID);
    env.deliver(&pkt).await;

    let mut junk = pkt.clone();
    junk.payload = Some(vec![0xde, 0xad]);
    env.deliver(&junk).await;

    assert_eq!(env.sink.last_action(), Some(PacketAction::PermanentBlock));
    let conn = env.store.get(&pkt.connection_id()).unwrap();
    assert_eq!(conn.lock().await.verdict, Verdict::Block);
}

// ============================================================================
// Attribution gating
// ============================================================================

#[tokio::test]
async fn test_unattributed_packets_are_dropped_until_pid_appears() {
    let env = PipelineEnv::new();
    register_default_process(&env, 1217);

    let mut pkt = packet(IpProtocol::Tcp, "1.1.1.1", 443);
    pkt.pid = None;
    env.deliver(&pkt).await;

    // No attribution: the undecided verdict maps to drop, stage holds.
    assert_eq!(env.sink.last_action(), Some(PacketAction::Drop));
    {
        let conn = env.store.get(&pkt.connection_id()).unwrap();
        assert_eq!(conn.lock().await.handler, HandlerStage::GatherData);
    }

    // The OS now reports the PID; the same flow is judged normally.
    pkt.pid = Some(1217);
    env.deliver(&pkt).await;
    assert_eq!(env.sink.last_action(), Some(PacketAction::PermanentAccept));
}

// ============================================================================
// Re-evaluation
// ============================================================================

#[tokio::test]
async fn test_reevaluation_applies_profile_change_once() {
    use vigil_infrastructure::reval::ReEvaluator;

    let env = PipelineEnv::new();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());
    env.process_lookup.add_process(make_process(
        1217,
        "/usr/bin/curl",
        "curl",
        profile.clone(),
    ));

    let pkt = packet(IpProtocol::Tcp, "1.1.1.1", 443);
    env.deliver(&pkt).await;
    {
        let conn = env.store.get(&pkt.connection_id()).unwrap();
        assert_eq!(conn.lock().await.verdict, Verdict::Accept);
    }

    let evaluator = ReEvaluator::new(
        env.store.clone(),
        env.procs.clone(),
        env.handler.clone(),
        env.sink.clone(),
        env.storage.clone(),
        env.process_lookup.clone(),
        env.prompts.clone(),
        env.tunnel.clone(),
    );

    // No configuration change: re-evaluation is a no-op.
    evaluator.reevaluate(None).await;
    assert!(env.sink.updates.lock().unwrap().is_empty());

    // Tighten the profile, then re-evaluate: the verdict flips once.
    profile.local_layer().set_settings(ProfileSettings {
        block_scope_internet: Some(true),
        ..Default::default()
    });
    profile.mark_outdated();

    evaluator.reevaluate(None).await;
    {
        let conn = env.store.get(&pkt.connection_id()).unwrap();
        let conn = conn.lock().await;
        assert_eq!(conn.verdict, Verdict::Block);
        assert_eq!(conn.reason.option_key.as_deref(), Some(options::BLOCK_INTERNET));
    }
    assert_eq!(env.sink.updates.lock().unwrap().len(), 1);

    // Idempotency: a second run with no further change changes nothing.
    evaluator.reevaluate(None).await;
    assert_eq!(env.sink.updates.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_internal_connections_are_exempt_from_reevaluation() {
    use vigil_infrastructure::reval::ReEvaluator;

    let env = PipelineEnv::new();
    let profile = layered_profile(ProfileSettings::default(), ProfileSettings::default());
    env.process_lookup.add_process(make_process(
        OWN_PID,
        "/opt/vigil/vigil",
        "vigil",
        profile.clone(),
    ));

    let mut pkt = packet(IpProtocol::Tcp, "9.9.9.9", 853);
    pkt.pid = Some(OWN_PID);
    env.deliver(&pkt).await;
    {
        let conn = env.store.get(&pkt.connection_id()).unwrap();
        assert!(conn.lock().await.internal);
    }

    profile.local_layer().set_settings(ProfileSettings {
        block_scope_internet: Some(true),
        ..Default::default()
    });
    profile.mark_outdated();

    let evaluator = ReEvaluator::new(
        env.store.clone(),
        env.procs.clone(),
        env.handler.clone(),
        env.sink.clone(),
        env.storage.clone(),
        env.process_lookup.clone(),
        env.prompts.clone(),
        env.tunnel.clone(),
    );
    evaluator.reevaluate(None).await;

    let conn = env.store.get(&pkt.connection_id()).unwrap();
    assert_eq!(conn.lock().await.verdict, Verdict::Accept);
}
