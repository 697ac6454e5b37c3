use std::path::Path;

use vigil_domain::{CliOverrides, Config};

/// Load the configuration file (or defaults when absent) and apply CLI
/// overrides on top.
pub fn load_config(path: &Path, overrides: &CliOverrides) -> anyhow::Result<Config> {
    let config = Config::load_or_default(path)?;
    Ok(config.apply_overrides(overrides))
}
