//! The connection-lifecycle core: store, per-connection handler stages,
//! packet dispatch workers and the inspector registry.

mod dispatcher;
mod handler;
mod inspect;
mod store;

pub use dispatcher::{spawn_bandwidth_worker, spawn_dispatcher, BandwidthEvent};
pub use handler::{FirewallHandler, HandlerDeps};
pub use inspect::{Inspector, InspectorRegistry, InspectorVerdict};
pub use store::{ConnectionStore, ProcessRegistry, SharedConn};
