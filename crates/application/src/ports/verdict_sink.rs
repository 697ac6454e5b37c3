use vigil_domain::{Connection, PacketAction, PacketInfo};

/// OS capture integration: per-packet actions and mid-flight verdict
/// updates. Implementations must be non-blocking; the dispatcher calls
/// these while holding the connection lock.
pub trait VerdictSinkPort: Send + Sync {
    /// Apply the action to one packet.
    fn issue(&self, packet: &PacketInfo, action: PacketAction);

    /// Tell the integration that a live connection's verdict changed, so
    /// the kernel state for the flow is refreshed.
    fn update_connection(&self, conn: &Connection);
}
