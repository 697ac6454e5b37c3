pub mod connections;
pub mod filterlists;
pub mod geoip;
pub mod netenv;
pub mod notifier;
pub mod process;
pub mod resolver;
pub mod storage;
pub mod verdict_sink;

pub use connections::ConnectionsViewPort;
pub use filterlists::FilterListPort;
pub use geoip::{GeoIpPort, Location};
pub use netenv::NetEnvPort;
pub use notifier::{NotifierPort, Prompt, PromptAction};
pub use process::ProcessLookupPort;
pub use resolver::ResolverPort;
pub use storage::{BatchSink, QueryIterator, StorageInterface};
pub use verdict_sink::VerdictSinkPort;
