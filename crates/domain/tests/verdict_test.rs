use std::net::IpAddr;
use vigil_domain::connection::{Connection, Reason};
use vigil_domain::packet::{Direction, IpProtocol, IpVersion, PacketInfo};
use vigil_domain::verdict::{PacketAction, Verdict};

fn outbound_packet() -> PacketInfo {
    PacketInfo {
        direction: Direction::Outbound,
        version: IpVersion::V4,
        protocol: IpProtocol::Tcp,
        local_ip: "10.0.0.2".parse::<IpAddr>().unwrap(),
        local_port: 51234,
        remote_ip: "1.1.1.1".parse::<IpAddr>().unwrap(),
        remote_port: 443,
        pid: Some(1217),
        fast_tracked: false,
        info_only: false,
        payload: None,
        icmp: None,
    }
}

#[test]
fn test_severity_ordering() {
    assert!(Verdict::Undecided < Verdict::Accept);
    assert!(Verdict::Accept < Verdict::RerouteToNameserver);
    assert!(Verdict::RerouteToNameserver < Verdict::RerouteToTunnel);
    assert!(Verdict::RerouteToTunnel < Verdict::Block);
    assert!(Verdict::Block < Verdict::Drop);
    assert!(Verdict::Drop < Verdict::Failed);
}

#[test]
fn test_connection_id_format() {
    let pkt = outbound_packet();
    assert_eq!(pkt.connection_id(), "6-10.0.0.2-51234-1.1.1.1-443");
}

#[test]
fn test_verdict_monotonicity() {
    let mut conn = Connection::from_packet(&outbound_packet());

    assert!(conn.accept(Reason::new("allowed")));
    assert_eq!(conn.verdict, Verdict::Accept);

    // Tightening is allowed...
    assert!(conn.block(Reason::new("blocked after all")));
    assert_eq!(conn.verdict, Verdict::Block);

    // ...a downgrade is rejected silently, keeping the stronger verdict.
    assert!(!conn.accept(Reason::new("liberated")));
    assert_eq!(conn.verdict, Verdict::Block);
    assert_eq!(conn.reason.message, "blocked after all");

    assert!(conn.set_verdict(Verdict::Drop, Reason::new("dropped")));
    assert!(!conn.set_verdict(Verdict::Block, Reason::new("relaxed")));
    assert_eq!(conn.verdict, Verdict::Drop);
}

#[test]
fn test_verdict_sequence_is_non_decreasing() {
    let mut conn = Connection::from_packet(&outbound_packet());
    let attempts = [
        Verdict::Accept,
        Verdict::RerouteToTunnel,
        Verdict::Accept,
        Verdict::Block,
        Verdict::RerouteToNameserver,
        Verdict::Drop,
    ];

    let mut seen = Vec::new();
    for v in attempts {
        conn.set_verdict(v, Reason::new("step"));
        seen.push(conn.verdict);
    }
    for pair in seen.windows(2) {
        assert!(pair[0] <= pair[1], "sequence decreased: {seen:?}");
    }
}

#[test]
fn test_deny_direction_mapping() {
    let mut conn = Connection::from_packet(&outbound_packet());
    conn.deny(Reason::new("policy"));
    assert_eq!(conn.verdict, Verdict::Block);

    let mut inbound = outbound_packet();
    inbound.direction = Direction::Inbound;
    let mut conn = Connection::from_packet(&inbound);
    conn.deny(Reason::new("policy"));
    assert_eq!(conn.verdict, Verdict::Drop);
}

#[test]
fn test_packet_action_mapping() {
    assert_eq!(Verdict::Accept.packet_action(false), PacketAction::Accept);
    assert_eq!(
        Verdict::Accept.packet_action(true),
        PacketAction::PermanentAccept
    );
    assert_eq!(
        Verdict::Block.packet_action(true),
        PacketAction::PermanentBlock
    );
    assert_eq!(Verdict::Drop.packet_action(false), PacketAction::Drop);
    assert_eq!(
        Verdict::RerouteToNameserver.packet_action(true),
        PacketAction::RerouteToNameserver
    );
    // Failed maps to a silent drop at the packet layer.
    assert_eq!(Verdict::Failed.packet_action(false), PacketAction::Drop);
    assert_eq!(Verdict::Undecided.packet_action(false), PacketAction::Drop);
}

#[test]
fn test_permanent_clears_handler() {
    use vigil_domain::connection::HandlerStage;

    let mut conn = Connection::from_packet(&outbound_packet());
    conn.handler = HandlerStage::Filter;
    conn.accept(Reason::new("ok"));
    conn.make_permanent();
    assert!(conn.verdict_permanent);
    assert_eq!(conn.handler, HandlerStage::Done);
}

#[test]
fn test_record_key_includes_pid() {
    let mut conn = Connection::from_packet(&outbound_packet());
    assert_eq!(conn.record_key(), "network:tree/0/6-10.0.0.2-51234-1.1.1.1-443");

    conn.process_ctx = Some(vigil_domain::ProcessContext {
        pid: 1217,
        ..Default::default()
    });
    assert_eq!(
        conn.record_key(),
        "network:tree/1217/6-10.0.0.2-51234-1.1.1.1-443"
    );
}
