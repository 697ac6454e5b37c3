//! Daemon loop: start the workers, wait for shutdown, drain cleanly.

use tracing::info;

use vigil_application::ports::StorageInterface;
use vigil_infrastructure::firewall::spawn_dispatcher;

use crate::di::Container;

pub async fn run(container: Container) -> anyhow::Result<()> {
    let Container {
        config: _,
        storage,
        store,
        handler,
        sink,
        evaluator,
        triggers,
        trigger_rx,
        jobs,
        shutdown,
        packet_tx,
        packet_rx,
    } = container;

    // Long-running workers.
    let dispatcher = spawn_dispatcher(store, handler, sink, packet_rx, shutdown.clone());
    let writer = storage.start_writer(shutdown.clone());
    let reval = evaluator.spawn(trigger_rx, shutdown.clone());
    jobs.start().await;

    // The capture shim owns `packet_tx`; dropping it here would close the
    // channel, so it is parked until an integration picks it up.
    let _capture_input = packet_tx;
    let _trigger_bus = triggers;

    info!("Vigil ready");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown.cancel();
    let _ = dispatcher.await;
    let _ = writer.await;
    let _ = reval.await;
    storage.shutdown().await?;

    Ok(())
}
