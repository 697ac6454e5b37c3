use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::CoreError;

use super::{DatabaseConfig, DnsConfig, FilterConfig, LifecycleConfig, LoggingConfig, ServerConfig};

/// Root configuration, loaded from a TOML file with CLI overrides applied
/// on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub filter: FilterConfig,
    pub dns: DnsConfig,
    pub lifecycle: LifecycleConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Values set on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub db_path: Option<String>,
    /// Binaries whose API access bypasses path checks.
    pub allowed_clients: Vec<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    /// Load the file if it exists, else start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn apply_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if let Some(db_path) = &overrides.db_path {
            self.database.path = db_path.clone();
        }
        self
    }
}
