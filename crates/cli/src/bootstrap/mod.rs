mod config;
mod database;
mod logging;

pub use config::load_config;
pub use database::open_storage;
pub use logging::init_logging;
