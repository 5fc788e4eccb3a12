//! Application configuration for spiderbase.
//!
//! User config lives at `~/.spiderbase/spiderbase.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpiderbaseError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "spiderbase.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".spiderbase";

// ---------------------------------------------------------------------------
// Config structs (matching spiderbase.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Ingestion settings.
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the result database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Retention window in days for `maintenance cleanup`.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_db_path() -> String {
    "spiderbase.db".into()
}
fn default_retention_days() -> u32 {
    30
}

/// `[ingest]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Field delimiter in crawl export files.
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

fn default_delimiter() -> char {
    ','
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.spiderbase/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SpiderbaseError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.spiderbase/spiderbase.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SpiderbaseError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SpiderbaseError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SpiderbaseError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SpiderbaseError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SpiderbaseError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
