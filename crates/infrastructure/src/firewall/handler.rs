use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use vigil_application::ports::{
    NetEnvPort, ProcessLookupPort, ResolverPort, StorageInterface, VerdictSinkPort,
};
use vigil_application::services::PreAuthPorts;
use vigil_application::{Decision, DeciderChain, DnsLinkage, GLOBAL_SCOPE};
use vigil_domain::config::{DnsConfig, FilterConfig, ServerConfig};
use vigil_domain::{
    Connection, ConnectionKind, HandlerStage, IpProtocol, IpScope, PacketInfo, Reason, Record,
    Verdict,
};

use super::inspect::InspectorRegistry;
use super::store::ProcessRegistry;
use crate::dns::wire;

/// Self-identifier the integration uses for flows it already denied.
const BLOCKED_SENTINEL: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 17);
/// Compatibility self-check probe address; dropping it is the feedback.
const COMPAT_PROBE: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 19);

const DHCP_PORTS: [u16; 4] = [67, 68, 546, 547];
const DNS_PORT: u16 = 53;

pub struct HandlerDeps {
    pub chain: DeciderChain,
    pub procs: Arc<ProcessRegistry>,
    pub preauth: Arc<PreAuthPorts>,
    pub process_lookup: Arc<dyn ProcessLookupPort>,
    pub resolver: Arc<dyn ResolverPort>,
    pub netenv: Arc<dyn NetEnvPort>,
    pub sink: Arc<dyn VerdictSinkPort>,
    pub linkage: Arc<DnsLinkage>,
    pub storage: Arc<dyn StorageInterface>,
    pub inspectors: InspectorRegistry,
    pub server_config: ServerConfig,
    pub filter_config: FilterConfig,
    pub dns_config: DnsConfig,
}

/// Per-connection firewall handler: a small state machine driven by each
/// delivered packet. The caller holds the connection lock for the whole
/// call, which serialises packets per connection.
pub struct FirewallHandler {
    deps: HandlerDeps,
}

impl FirewallHandler {
    pub fn new(deps: HandlerDeps) -> Self {
        Self { deps }
    }

    pub async fn handle_packet(&self, conn: &mut Connection, pkt: &PacketInfo) {
        // Metadata-only events must never result in a packet verdict.
        if pkt.info_only {
            trace!(conn = %conn.id, "Ignoring info-only packet event");
            return;
        }

        loop {
            match conn.handler {
                HandlerStage::FastTrack => {
                    if self.fast_track(conn, pkt) {
                        return;
                    }
                    conn.handler = HandlerStage::GatherData;
                }
                HandlerStage::GatherData => {
                    if self.gather_data(conn, pkt).await {
                        conn.handler = HandlerStage::Filter;
                    } else {
                        // Attribution incomplete; hold this stage for
                        // future packets. The current packet gets the
                        // stored (undecided) verdict.
                        self.issue(conn, pkt, false);
                        return;
                    }
                }
                HandlerStage::Filter => {
                    self.filter(conn, pkt).await;
                    return;
                }
                HandlerStage::InspectDnsPacket => {
                    self.inspect_dns(conn, pkt).await;
                    return;
                }
                HandlerStage::InspectAndVerdict => {
                    self.inspect(conn, pkt);
                    return;
                }
                HandlerStage::Done => {
                    // Default handler: just issue the stored verdict.
                    self.issue(conn, pkt, conn.verdict_permanent);
                    return;
                }
            }
        }
    }

    /// Re-run the decider for a live connection (re-evaluation entry
    /// point). Returns true when the verdict changed.
    pub async fn filter_connection(&self, conn: &mut Connection) -> bool {
        let Some(process) = conn.pid().and_then(|pid| self.deps.procs.get(pid)) else {
            return false;
        };
        let profile = process.profile();
        if profile.needs_update() {
            profile.update();
        }
        conn.profile_revision = profile.revision_cnt();

        let resolved = profile.lock_for_usage().clone();
        let previous = conn.verdict;
        let decision = self.deps.chain.decide(conn, &resolved).await;
        self.apply_decision(conn, decision);
        conn.verdict != previous
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    /// Cheap, OS-independent rules that may finalise a verdict in one
    /// pass. Returns true when it issued an action for this packet.
    fn fast_track(&self, conn: &mut Connection, pkt: &PacketInfo) -> bool {
        if pkt.fast_tracked {
            conn.accept(Reason::new("fast-tracked by the capture layer"));
            self.issue(conn, pkt, true);
            return true;
        }

        let remote = conn.entity.ip;

        if remote == Some(IpAddr::V4(BLOCKED_SENTINEL)) {
            conn.block(Reason::new("flow already denied by the integration"));
            self.issue(conn, pkt, false);
            return true;
        }

        // ICMP other than echo stays observable, so errors keep flowing
        // while the flow that caused them is judged on its own.
        if conn.protocol.is_icmp() && !pkt.is_icmp_echo() {
            conn.accept(Reason::new("ICMP control traffic"));
            let action = Verdict::Accept.packet_action(false);
            self.deps.sink.issue(pkt, action);
            return true;
        }

        if conn.protocol == IpProtocol::Udp
            && (DHCP_PORTS.contains(&conn.local_port) || DHCP_PORTS.contains(&conn.entity.port))
        {
            let band_ok = matches!(
                conn.entity.ip_scope(),
                IpScope::LinkLocal | IpScope::SiteLocal | IpScope::LocalMulticast
            ) || remote == Some(IpAddr::V4(Ipv4Addr::BROADCAST));
            if band_ok {
                conn.accept(Reason::new("DHCP on the local network"));
                self.issue(conn, pkt, true);
                return true;
            }
        }

        if conn.protocol == IpProtocol::Tcp
            && conn.entity.port == self.deps.server_config.api_port
        {
            if remote.map(|ip| self.deps.netenv.is_local_ip(ip)).unwrap_or(false) {
                conn.internal = true;
                conn.accept(Reason::new("connection to the local API"));
                self.issue(conn, pkt, true);
                return true;
            }
            // Not actually local: judged by the full pipeline.
        }

        if conn.entity.port == DNS_PORT
            && remote.map(|ip| self.deps.resolver.is_nameserver_ip(ip)).unwrap_or(false)
        {
            conn.internal = true;
            conn.accept(Reason::new("connection to the local nameserver"));
            // Only permanent once the PID is known; sibling flows without
            // attribution stay ephemeral and re-enter here.
            self.issue(conn, pkt, pkt.pid.is_some());
            return true;
        }

        if remote == Some(IpAddr::V4(COMPAT_PROBE)) {
            conn.drop_conn(Reason::new("system integration compatibility probe"));
            self.issue(conn, pkt, false);
            return true;
        }

        false
    }

    /// Enrich the connection with process and profile data. Returns true
    /// once everything needed by the filter stage is present.
    async fn gather_data(&self, conn: &mut Connection, pkt: &PacketInfo) -> bool {
        if conn.process_ctx.is_none() {
            let pid = match pkt.pid {
                Some(pid) => Some(pid),
                None => self
                    .deps
                    .process_lookup
                    .pid_of_connection(pkt)
                    .await
                    .unwrap_or_default(),
            };
            let Some(pid) = pid else {
                debug!(conn = %conn.id, "PID not yet known");
                return false;
            };

            match self.deps.process_lookup.process(pid).await {
                Ok(process) => {
                    let profile = process.profile();
                    if profile.needs_update() {
                        profile.update();
                    }
                    conn.profile_revision = profile.revision_cnt();
                    {
                        let resolved = profile.lock_for_usage();
                        conn.history_enabled = resolved.history_enabled;
                        conn.bandwidth_enabled = resolved.bandwidth_enabled;
                    }
                    conn.process_ctx = Some(process.context());
                    self.deps.procs.insert(process);
                }
                Err(e) => {
                    debug!(conn = %conn.id, pid, error = %e, "Process lookup failed");
                    return false;
                }
            }
        }

        // Attribute the remote IP to the domain that resolved it.
        if conn.entity.domain.is_none() && conn.kind == ConnectionKind::Ip {
            if let Some(ip) = conn.entity.ip {
                let scope = conn
                    .profile_scope()
                    .unwrap_or_else(|| GLOBAL_SCOPE.to_string());
                if let Some(resolved) = self.deps.linkage.lookup(&scope, ip) {
                    conn.entity.set_domain(&resolved.domain);
                    conn.entity.cnames = resolved.cnames;
                    conn.resolver_info = Some(resolved.resolver);
                }
            }
        }

        true
    }

    async fn filter(&self, conn: &mut Connection, pkt: &PacketInfo) {
        // Ports the firewall allocated to itself for outbound dialling.
        if !conn.direction.is_inbound()
            && self.deps.preauth.use_port(conn.protocol, conn.local_port)
        {
            conn.internal = true;
            conn.accept(Reason::new("connection by Vigil"));
            conn.stop_firewall_handler();
            self.issue(conn, pkt, true);
            self.persist(conn).await;
            return;
        }

        // Outbound DNS that is not for our nameserver is redirected to it
        // while interception is on and the local resolver is active.
        if self.should_intercept_dns(conn) {
            conn.internal = true;
            conn.set_verdict(
                Verdict::RerouteToNameserver,
                Reason::new("redirecting DNS query to the local nameserver"),
            );
            conn.stop_firewall_handler();
            self.issue(conn, pkt, false);
            self.persist(conn).await;
            return;
        }

        let Some(process) = conn.pid().and_then(|pid| self.deps.procs.get(pid)) else {
            conn.failed(Reason::new("connection lost its process attribution"));
            conn.stop_firewall_handler();
            self.issue(conn, pkt, false);
            self.persist(conn).await;
            return;
        };
        let profile = process.profile();
        if profile.needs_update() {
            profile.update();
        }
        conn.profile_revision = profile.revision_cnt();

        let resolved = profile.lock_for_usage().clone();
        let decision = self.deps.chain.decide(conn, &resolved).await;
        self.apply_decision(conn, decision);

        if conn.inspecting && conn.verdict <= Verdict::Accept {
            if is_plain_dns_flow(conn) {
                conn.handler = HandlerStage::InspectDnsPacket;
            } else {
                conn.handler = HandlerStage::InspectAndVerdict;
                conn.inspector_mask = self.deps.inspectors.full_mask();
            }
            self.issue(conn, pkt, false);
        } else {
            conn.stop_firewall_handler();
            let permanent = matches!(
                conn.verdict,
                Verdict::Accept | Verdict::Block | Verdict::Drop | Verdict::Failed
            );
            self.issue(conn, pkt, permanent);
        }
        self.persist(conn).await;
    }

    /// Parse the UDP payload as a DNS message. A failed parse blocks the
    /// flow permanently; observed answers feed the IP→domain map before
    /// the packet is accepted.
    async fn inspect_dns(&self, conn: &mut Connection, pkt: &PacketInfo) {
        let Some(payload) = pkt.payload.as_deref() else {
            self.issue(conn, pkt, false);
            return;
        };

        match wire::parse_dns_payload(payload, conn.entity.ip) {
            Ok(Some(mut rrcache)) => {
                rrcache.clean(self.deps.dns_config.min_cache_ttl);
                // Requests by the system resolver serve the whole host;
                // their associations go under the global sentinel scope.
                let scope = match conn.pid() {
                    Some(pid) if self.deps.process_lookup.is_system_resolver(pid) => None,
                    _ => conn.profile_scope(),
                };
                self.deps
                    .linkage
                    .observe_response(&rrcache, scope.as_deref())
                    .await;
                self.issue(conn, pkt, false);
            }
            Ok(None) => {
                // A query, not a response; nothing to learn yet.
                self.issue(conn, pkt, false);
            }
            Err(e) => {
                debug!(conn = %conn.id, error = %e, "Blocking flow with unparsable DNS payload");
                conn.block(Reason::new("unparsable DNS payload on port 53"));
                conn.stop_firewall_handler();
                self.issue(conn, pkt, true);
                self.persist(conn).await;
            }
        }
    }

    fn inspect(&self, conn: &mut Connection, pkt: &PacketInfo) {
        let packet_override = self.deps.inspectors.run(conn, pkt);
        if !conn.inspecting {
            conn.stop_firewall_handler();
        }
        match packet_override {
            Some(verdict) => {
                self.deps.sink.issue(pkt, verdict.packet_action(false));
            }
            None => {
                let permanent = !conn.inspecting && conn.verdict != Verdict::Accept;
                self.issue(conn, pkt, permanent);
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn apply_decision(&self, conn: &mut Connection, decision: Decision) {
        match decision {
            Decision::Allowed(reason) => {
                conn.accept(reason);
            }
            Decision::Denied(reason) => {
                conn.deny(reason);
            }
            Decision::RerouteToTunnel(reason) => {
                conn.tunneled = true;
                conn.set_verdict(Verdict::RerouteToTunnel, reason);
            }
            Decision::NoMatch => {
                conn.failed(Reason::new("decider chain returned no decision"));
            }
        }
    }

    fn should_intercept_dns(&self, conn: &Connection) -> bool {
        self.deps.filter_config.dns_query_interception
            && !self.deps.resolver.is_disabled()
            && !conn.direction.is_inbound()
            && conn.protocol == IpProtocol::Udp
            && conn.entity.port == DNS_PORT
            && !conn
                .entity
                .ip
                .map(|ip| self.deps.resolver.is_nameserver_ip(ip))
                .unwrap_or(false)
    }

    /// Map the stored verdict to a packet action and hand it to the
    /// capture layer. Permanent actions also clear the handler slot.
    fn issue(&self, conn: &mut Connection, pkt: &PacketInfo, permanent: bool) {
        let permanent = permanent && self.deps.filter_config.permanent_verdicts;
        let action = conn.verdict.packet_action(permanent);
        self.deps.sink.issue(pkt, action);
        if action.is_permanent() {
            conn.make_permanent();
        }
    }

    /// Mirror the connection into the record store for UI listings and
    /// the debug dump. Best effort.
    async fn persist(&self, conn: &Connection) {
        let key = conn.record_key();
        let key = key.trim_start_matches("network:");
        match Record::from_value("network", key, conn) {
            Ok(record) => {
                if let Err(e) = self.deps.storage.put(record).await {
                    warn!(conn = %conn.id, error = %e, "Failed to persist connection");
                }
            }
            Err(e) => warn!(conn = %conn.id, error = %e, "Failed to serialise connection"),
        }
    }
}

fn is_plain_dns_flow(conn: &Connection) -> bool {
    !conn.direction.is_inbound()
        && conn.protocol == IpProtocol::Udp
        && conn.entity.port == DNS_PORT
}
