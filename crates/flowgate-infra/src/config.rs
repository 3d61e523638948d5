//! Engine configuration loader for flowgate.
//!
//! Reads `flowgate.toml` from the config directory and deserializes it into
//! [`EngineConfig`]. `load_engine_config` falls back to defaults when the
//! file is missing or malformed; `read_engine_config` reports why.

use std::path::{Path, PathBuf};

use flowgate_types::config::EngineConfig;
use thiserror::Error;

/// File name looked up inside the config directory.
pub const CONFIG_FILE_NAME: &str = "flowgate.toml";

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "FLOWGATE_CONFIG_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Resolve the config directory.
///
/// Priority:
/// 1. `FLOWGATE_CONFIG_DIR` environment variable
/// 2. Platform config directory (e.g. `~/.config/flowgate` on Linux)
/// 3. `.flowgate` in the current directory
pub fn resolve_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    if let Some(base) = dirs::config_dir() {
        return base.join("flowgate");
    }
    PathBuf::from(".flowgate")
}

/// Read and parse a specific config file, surfacing every failure.
pub async fn read_engine_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `{config_dir}/flowgate.toml`, treating a missing file as defaults.
///
/// Unreadable or unparseable files are returned as errors so the caller can
/// report them once logging is up.
pub async fn try_load_engine_config(config_dir: &Path) -> Result<EngineConfig, ConfigError> {
    let config_path = config_dir.join(CONFIG_FILE_NAME);

    match read_engine_config(&config_path).await {
        Err(ConfigError::Read { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::debug!(
                "No {CONFIG_FILE_NAME} found at {}, using defaults",
                config_path.display()
            );
            Ok(EngineConfig::default())
        }
        other => other,
    }
}

/// Load `{config_dir}/flowgate.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparseable file: logs a warning and returns defaults.
pub async fn load_engine_config(config_dir: &Path) -> EngineConfig {
    try_load_engine_config(config_dir).await.unwrap_or_else(|err| {
        tracing::warn!("{err}, using defaults");
        EngineConfig::default()
    })
}
