use async_trait::async_trait;

use vigil_domain::{CoreError, PacketInfo, Process};

/// Process-identification collaborator: socket → PID and PID → process
/// with its layered profile.
#[async_trait]
pub trait ProcessLookupPort: Send + Sync {
    /// PID owning the socket of this packet, if the OS can tell.
    async fn pid_of_connection(&self, packet: &PacketInfo) -> Result<Option<u32>, CoreError>;

    async fn process(&self, pid: u32) -> Result<Process, CoreError>;

    /// Whether this PID is the host system's DNS resolver service.
    fn is_system_resolver(&self, pid: u32) -> bool;

    /// Connection IDs the OS state table currently reports, used by the
    /// cleaner to detect ended flows.
    async fn active_connection_ids(&self) -> Vec<String>;
}
