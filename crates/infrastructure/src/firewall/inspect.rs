use vigil_domain::{Connection, PacketInfo, Verdict};

/// What one inspector wants done with the inspected packet or flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorVerdict {
    DoNothing,
    BlockPacket,
    DropPacket,
    BlockConn,
    DropConn,
    StopInspecting,
}

/// A packet inspector. Registered with a name and the maximum verdict
/// severity at which it still wants to see packets; once the connection's
/// verdict exceeds that window the dispatcher skips it.
pub trait Inspector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspection window: the inspector is skipped when the connection's
    /// verdict is more severe than this.
    fn max_verdict(&self) -> Verdict;

    fn inspect(&self, conn: &mut Connection, packet: &PacketInfo) -> InspectorVerdict;
}

/// Explicit registry owned by the composition root; no process-wide
/// state, so tests can build isolated registries.
#[derive(Default)]
pub struct InspectorRegistry {
    inspectors: Vec<Box<dyn Inspector>>,
}

impl InspectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, inspector: Box<dyn Inspector>) {
        self.inspectors.push(inspector);
    }

    pub fn is_empty(&self) -> bool {
        self.inspectors.is_empty()
    }

    /// Bitmask with one bit per registered inspector.
    pub fn full_mask(&self) -> u64 {
        if self.inspectors.len() >= 64 {
            u64::MAX
        } else {
            (1u64 << self.inspectors.len()) - 1
        }
    }

    /// Run all active inspectors on one packet. Returns the strongest
    /// per-packet verdict override, if any. Inspectors that produced a
    /// permanent decision or stopped are masked out on the connection;
    /// when the mask empties, inspection ends.
    pub fn run(&self, conn: &mut Connection, packet: &PacketInfo) -> Option<Verdict> {
        let mut packet_override: Option<Verdict> = None;

        for (index, inspector) in self.inspectors.iter().enumerate() {
            let bit = 1u64 << index.min(63);
            if conn.inspector_mask & bit == 0 {
                continue;
            }
            // The verdict has moved past this inspector's window.
            if conn.verdict > inspector.max_verdict() {
                conn.inspector_mask &= !bit;
                continue;
            }

            match inspector.inspect(conn, packet) {
                InspectorVerdict::DoNothing => {}
                InspectorVerdict::BlockPacket => {
                    packet_override = packet_override.max(Some(Verdict::Block));
                }
                InspectorVerdict::DropPacket => {
                    packet_override = packet_override.max(Some(Verdict::Drop));
                }
                InspectorVerdict::BlockConn => {
                    conn.block(vigil_domain::Reason::new(format!(
                        "blocked by inspector {}",
                        inspector.name()
                    )));
                    conn.inspector_mask &= !bit;
                }
                InspectorVerdict::DropConn => {
                    conn.drop_conn(vigil_domain::Reason::new(format!(
                        "dropped by inspector {}",
                        inspector.name()
                    )));
                    conn.inspector_mask &= !bit;
                }
                InspectorVerdict::StopInspecting => {
                    conn.inspector_mask &= !bit;
                }
            }
        }

        if conn.inspector_mask == 0 {
            conn.inspecting = false;
        }
        packet_override
    }
}
