use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_application::ports::VerdictSinkPort;
use vigil_domain::{Connection, PacketAction, PacketInfo};

use super::handler::FirewallHandler;
use super::store::ConnectionStore;

/// Single consumer of the capture input channel.
///
/// Handlers run inline, which serialises packets for the same connection
/// in arrival order. On shutdown, buffered packets are drained to a
/// definitive drop so the kernel queue is never left blocked.
pub fn spawn_dispatcher(
    store: Arc<ConnectionStore>,
    handler: Arc<FirewallHandler>,
    sink: Arc<dyn VerdictSinkPort>,
    mut packets: mpsc::Receiver<PacketInfo>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Packet dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    // Drain in-flight packets to a definitive verdict.
                    while let Ok(pkt) = packets.try_recv() {
                        if !pkt.info_only {
                            sink.issue(&pkt, PacketAction::Drop);
                        }
                    }
                    info!("Packet dispatcher stopped");
                    return;
                }
                maybe_pkt = packets.recv() => {
                    let Some(pkt) = maybe_pkt else {
                        info!("Packet channel closed, dispatcher stopping");
                        return;
                    };
                    dispatch(&store, &handler, &pkt).await;
                }
            }
        }
    })
}

async fn dispatch(store: &ConnectionStore, handler: &FirewallHandler, pkt: &PacketInfo) {
    let conn = match store.get(&pkt.connection_id()) {
        Some(conn) => conn,
        None => {
            debug!(conn = %pkt.connection_id(), "New connection");
            store.add(Connection::from_packet(pkt))
        }
    };
    let mut guard = conn.lock().await;
    handler.handle_packet(&mut guard, pkt).await;
}

/// One bandwidth accounting event from the capture layer.
#[derive(Debug, Clone)]
pub struct BandwidthEvent {
    pub conn_id: String,
    pub bytes_received: u64,
    pub bytes_sent: u64,
}

/// Consumes bandwidth events and updates connection counters. Uses
/// `try_lock` and drops the update when the connection is busy with a
/// handler, to avoid priority inversion on the hot path.
pub fn spawn_bandwidth_worker(
    store: Arc<ConnectionStore>,
    mut events: mpsc::Receiver<BandwidthEvent>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("Bandwidth worker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Bandwidth worker stopped");
                    return;
                }
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { return };
                    let Some(conn) = store.get(&event.conn_id) else {
                        continue;
                    };
                    match conn.try_lock() {
                        Ok(mut conn) => {
                            if !conn.bandwidth_enabled {
                                continue;
                            }
                            conn.bytes_received += event.bytes_received;
                            conn.bytes_sent += event.bytes_sent;
                        }
                        Err(_) => {
                            warn!(conn = %event.conn_id, "Connection busy, dropping bandwidth update");
                        }
                    }
                }
            }
        }
    })
}
