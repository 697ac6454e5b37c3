use serde::{Deserialize, Serialize};

/// Terminal decision for a connection.
///
/// Ordering is by severity: a live connection's verdict may only move to an
/// equal or more severe value. `Failed` is the most severe because it maps
/// to a silent drop plus a persisted ended connection for forensics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Verdict {
    Undecided = 0,
    Accept = 1,
    RerouteToNameserver = 2,
    RerouteToTunnel = 3,
    Block = 4,
    Drop = 5,
    Failed = 6,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Undecided => "undecided",
            Verdict::Accept => "accept",
            Verdict::RerouteToNameserver => "reroute-to-nameserver",
            Verdict::RerouteToTunnel => "reroute-to-tunnel",
            Verdict::Block => "block",
            Verdict::Drop => "drop",
            Verdict::Failed => "failed",
        }
    }

    /// Whether a transition from `self` to `new` is a tightening (allowed on
    /// a live connection) rather than a relaxation.
    pub fn allows_transition_to(&self, new: Verdict) -> bool {
        new >= *self
    }

    /// Map the stored verdict to the action requested from the capture layer
    /// for one packet. `permanent` asks the capture layer to stop delivering
    /// further packets for this flow.
    pub fn packet_action(&self, permanent: bool) -> PacketAction {
        match (self, permanent) {
            (Verdict::Accept, false) => PacketAction::Accept,
            (Verdict::Accept, true) => PacketAction::PermanentAccept,
            (Verdict::Block, false) => PacketAction::Block,
            (Verdict::Block, true) => PacketAction::PermanentBlock,
            (Verdict::Drop, false) => PacketAction::Drop,
            (Verdict::Drop, true) => PacketAction::PermanentDrop,
            (Verdict::RerouteToNameserver, _) => PacketAction::RerouteToNameserver,
            (Verdict::RerouteToTunnel, _) => PacketAction::RerouteToTunnel,
            // An undecided or failed connection must not leak packets.
            (Verdict::Undecided, _) | (Verdict::Failed, _) => PacketAction::Drop,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-packet action consumed by the OS capture layer.
///
/// `Block` is a TCP-RST-equivalent reject; `Drop` is silent. The permanent
/// variants additionally tell the kernel integration to remember the answer
/// and stop delivering packets for the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketAction {
    Accept,
    PermanentAccept,
    Block,
    PermanentBlock,
    Drop,
    PermanentDrop,
    RerouteToNameserver,
    RerouteToTunnel,
}

impl PacketAction {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PacketAction::PermanentAccept
                | PacketAction::PermanentBlock
                | PacketAction::PermanentDrop
        )
    }
}
