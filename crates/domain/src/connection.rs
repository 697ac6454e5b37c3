use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::entity::Entity;
use crate::packet::{Direction, IpProtocol, IpVersion, PacketInfo};
use crate::process::ProcessContext;
use crate::rrcache::ResolverInfo;
use crate::verdict::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    Ip,
    DnsRequest,
}

/// Stage of the per-connection firewall handler.
///
/// The per-packet routine matches on the stage and updates it; `Done` is
/// the default handler that just re-issues the stored verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum HandlerStage {
    #[default]
    FastTrack,
    GatherData,
    Filter,
    InspectDnsPacket,
    InspectAndVerdict,
    Done,
}

/// Machine- and human-readable explanation of a verdict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reason {
    pub message: String,
    /// The profile option that drove the decision, e.g. `filter/blockP2P`.
    pub option_key: Option<String>,
    /// Structured context for the UI (list IDs, rule text).
    pub context: Option<serde_json::Value>,
}

impl Reason {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            option_key: None,
            context: None,
        }
    }

    pub fn with_option(message: impl Into<String>, option_key: &str) -> Self {
        Self {
            message: message.into(),
            option_key: Some(option_key.to_string()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Canonical record of one network flow: identity, attribution, verdict
/// and lifecycle state.
///
/// Mutated exclusively by the single handler worker that owns its lock at
/// any instant; the store hands out `Arc<Mutex<Connection>>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub kind: ConnectionKind,
    pub direction: Direction,
    pub ip_version: IpVersion,
    pub protocol: IpProtocol,
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub entity: Entity,
    pub process_ctx: Option<ProcessContext>,
    pub resolver_info: Option<ResolverInfo>,

    pub verdict: Verdict,
    pub reason: Reason,
    pub verdict_permanent: bool,

    /// Unix seconds.
    pub started: i64,
    /// Unix seconds; 0 while the flow is live.
    pub ended: i64,
    pub ended_cause: Option<String>,

    pub bytes_received: u64,
    pub bytes_sent: u64,

    pub encrypted: bool,
    pub tunneled: bool,
    pub internal: bool,
    pub inspecting: bool,
    pub history_enabled: bool,
    pub bandwidth_enabled: bool,

    pub handler: HandlerStage,
    pub profile_revision: u64,
    /// Bitset of inspectors that still want to see packets.
    pub inspector_mask: u64,
    pub inspector_data: HashMap<String, serde_json::Value>,
    /// Active user prompt, if any; cancelled on re-evaluation.
    pub prompt_id: Option<String>,
}

impl Connection {
    /// Create an incomplete connection from the first packet of a new
    /// 5-tuple. Process attribution happens in the gather-data stage.
    pub fn from_packet(pkt: &PacketInfo) -> Self {
        Self {
            id: pkt.connection_id(),
            kind: ConnectionKind::Ip,
            direction: pkt.direction,
            ip_version: pkt.version,
            protocol: pkt.protocol,
            local_ip: pkt.local_ip,
            local_port: pkt.local_port,
            entity: Entity::from_ip(pkt.remote_ip, pkt.protocol, pkt.remote_port),
            process_ctx: None,
            resolver_info: None,
            verdict: Verdict::Undecided,
            reason: Reason::default(),
            verdict_permanent: false,
            started: Utc::now().timestamp(),
            ended: 0,
            ended_cause: None,
            bytes_received: 0,
            bytes_sent: 0,
            encrypted: false,
            tunneled: false,
            internal: false,
            inspecting: false,
            history_enabled: false,
            bandwidth_enabled: false,
            handler: HandlerStage::FastTrack,
            profile_revision: 0,
            inspector_mask: 0,
            inspector_data: HashMap::new(),
            prompt_id: None,
        }
    }

    /// Create a DNS request record with a synthetic ID, carrying the same
    /// process context as an IP connection would.
    pub fn new_dns_request(domain: &str, process_ctx: Option<ProcessContext>) -> Self {
        let pid = process_ctx.as_ref().map(|p| p.pid).unwrap_or(0);
        Self {
            id: format!("dns-{pid}-{domain}"),
            kind: ConnectionKind::DnsRequest,
            direction: Direction::Outbound,
            ip_version: IpVersion::V4,
            protocol: IpProtocol::Udp,
            local_ip: IpAddr::from([127, 0, 0, 1]),
            local_port: 0,
            entity: Entity::from_domain(domain),
            process_ctx,
            resolver_info: None,
            verdict: Verdict::Undecided,
            reason: Reason::default(),
            verdict_permanent: false,
            started: Utc::now().timestamp(),
            ended: 0,
            ended_cause: None,
            bytes_received: 0,
            bytes_sent: 0,
            encrypted: false,
            tunneled: false,
            internal: false,
            inspecting: false,
            history_enabled: false,
            bandwidth_enabled: false,
            handler: HandlerStage::Done,
            profile_revision: 0,
            inspector_mask: 0,
            inspector_data: HashMap::new(),
            prompt_id: None,
        }
    }

    pub fn has_ended(&self) -> bool {
        self.ended != 0
    }

    pub fn set_ended(&mut self, cause: Option<String>) {
        if self.ended == 0 {
            self.ended = Utc::now().timestamp();
            self.ended_cause = cause;
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process_ctx.as_ref().map(|p| p.pid)
    }

    /// Scoped profile ID (`source/id`) of the attributed process, if known.
    pub fn profile_scope(&self) -> Option<String> {
        self.process_ctx
            .as_ref()
            .map(|p| format!("{}/{}", p.profile_source, p.profile_id))
    }

    /// Apply a verdict. Transitions are monotonic in severity: a downgrade
    /// attempt on a live connection is rejected silently, keeping the
    /// stronger verdict, and `false` is returned.
    pub fn set_verdict(&mut self, verdict: Verdict, reason: Reason) -> bool {
        if !self.verdict.allows_transition_to(verdict) {
            return false;
        }
        self.verdict = verdict;
        self.reason = reason;
        true
    }

    /// Mark the verdict permanent: the kernel integration has been told a
    /// final answer. Clears the handler slot; further decider runs are
    /// no-ops for the same packet.
    pub fn make_permanent(&mut self) {
        self.verdict_permanent = true;
        self.handler = HandlerStage::Done;
    }

    pub fn accept(&mut self, reason: Reason) -> bool {
        self.set_verdict(Verdict::Accept, reason)
    }

    pub fn block(&mut self, reason: Reason) -> bool {
        self.set_verdict(Verdict::Block, reason)
    }

    pub fn deny(&mut self, reason: Reason) -> bool {
        // Inbound flows are dropped silently; outbound blocks are rejected
        // so applications fail fast instead of hanging.
        match self.direction {
            Direction::Inbound => self.set_verdict(Verdict::Drop, reason),
            Direction::Outbound => self.set_verdict(Verdict::Block, reason),
        }
    }

    pub fn drop_conn(&mut self, reason: Reason) -> bool {
        self.set_verdict(Verdict::Drop, reason)
    }

    pub fn failed(&mut self, reason: Reason) -> bool {
        self.set_verdict(Verdict::Failed, reason)
    }

    /// Stop the firewall handler; the default handler applies afterwards
    /// and just issues the stored verdict.
    pub fn stop_firewall_handler(&mut self) {
        self.handler = HandlerStage::Done;
    }

    /// Storage key under which this connection is persisted.
    pub fn record_key(&self) -> String {
        let pid = self.pid().unwrap_or(0);
        match self.kind {
            ConnectionKind::Ip => format!("network:tree/{pid}/{}", self.id),
            ConnectionKind::DnsRequest => format!("network:tree/{pid}/dns/{}", self.id),
        }
    }
}
