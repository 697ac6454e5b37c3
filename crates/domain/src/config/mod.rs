//! Configuration structures, organised by area:
//! - `root`: main configuration, file loading and CLI overrides
//! - `server`: local API and nameserver binding
//! - `filter`: policy engine settings
//! - `dns`: DNS cache settings
//! - `database`: storage configuration
//! - `logging`: logging settings
//! - `options`: the typed profile option keys the core consults

pub mod database;
pub mod dns;
pub mod filter;
pub mod lifecycle;
pub mod logging;
pub mod options;
pub mod root;
pub mod server;

pub use database::DatabaseConfig;
pub use dns::DnsConfig;
pub use filter::FilterConfig;
pub use lifecycle::LifecycleConfig;
pub use logging::LoggingConfig;
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
