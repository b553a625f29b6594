mod types;

pub use types::*;

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

/// Returns the config directory: <platform config dir>/posture-vest/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("posture-vest");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: <platform config dir>/posture-vest/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load config from the platform config dir, or return default if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        info!(?path, "No config found, using defaults");
        return Ok(AppConfig::default());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config = parse_config(&contents)?;
    info!(?path, layout = ?config.sensors.layout, "Loaded config");
    Ok(config)
}

/// Parse a TOML document into an [`AppConfig`]. Missing sections fall back to defaults.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    Ok(toml::from_str(contents)?)
}

/// Save config to the platform config dir.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

/// Write `config` as TOML to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    info!(?path, "Saved config");
    Ok(())
}
