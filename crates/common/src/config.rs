//! Configuration file handling: `data_dir/conf.json`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A configured bridge address/protocol pair. The bridge's own behavior is
/// out of scope here; this is purely the configuration-layer shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Protocol tag, e.g. `"ws"` or `"http"`.
    pub protocol: String,
    /// Host address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Optional zero-conf advertisement configuration. Opaque beyond its
/// presence: advertising behavior itself is out of scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisementConfig {
    /// Whether advertisement is enabled.
    pub enabled: bool,
    /// Advertised service name.
    pub name: String,
}

/// The host's top-level configuration, loaded from `data_dir/conf.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding protocol documents, logs and output files.
    pub data_dir: PathBuf,
    /// A stable identifier for this host instance.
    pub identifier: String,
    /// Schema version of this configuration file.
    pub version: u32,
    /// Configured bridges, if any.
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
    /// Advertisement configuration, if any.
    #[serde(default)]
    pub advertisement: Option<AdvertisementConfig>,
}

/// The current configuration schema version; configs from an older
/// version are rejected rather than silently misinterpreted.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Errors loading or validating a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found at {0}")]
    NotFound(PathBuf),
    /// The file exists but could not be read.
    #[error("failed to read configuration file at {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file exists but is not valid JSON, or does not match the
    /// expected shape.
    #[error("failed to parse configuration file at {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
    /// The file parsed but declares an unsupported schema version.
    #[error("unsupported configuration version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build expects.
        expected: u32,
    },
}

impl Config {
    /// The default configuration file name under a data directory.
    pub const FILE_NAME: &'static str = "conf.json";

    /// Build a fresh default configuration rooted at `data_dir`.
    pub fn default_for(data_dir: impl Into<PathBuf>, identifier: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            identifier: identifier.into(),
            version: CURRENT_CONFIG_VERSION,
            bridges: Vec::new(),
            advertisement: None,
        }
    }

    /// Load and validate the configuration file at `data_dir/conf.json`.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(Self::FILE_NAME);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let config: Config =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;

        if config.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                expected: CURRENT_CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Write this configuration to `data_dir/conf.json`, creating
    /// `data_dir` if necessary.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(Self::FILE_NAME);
        let contents = serde_json::to_string_pretty(self).expect("Config serialization cannot fail");
        std::fs::write(path, contents)
    }

    /// Resolve the default data directory, matching the corpus's use of
    /// platform-appropriate data directories.
    pub fn default_data_dir(identifier: &str) -> PathBuf {
        dirs_next::data_dir().unwrap_or_else(std::env::temp_dir).join("labflow").join(identifier)
    }
}

/// Process exit codes, matching the documented contract: `0` on clean
/// shutdown, `1` on missing configuration, a distinct nonzero code on
/// malformed configuration or other fatal initialization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Clean shutdown.
    Success = 0,
    /// Configuration file was not found.
    MissingConfig = 1,
    /// Configuration file exists but failed to parse or validate.
    InvalidConfig = 2,
    /// Any other fatal initialization failure.
    FatalError = 3,
}

impl From<&ConfigError> for ExitCode {
    fn from(error: &ConfigError) -> Self {
        match error {
            ConfigError::NotFound(_) => ExitCode::MissingConfig,
            ConfigError::Read { .. } | ConfigError::Parse { .. } | ConfigError::UnsupportedVersion { .. } => {
                ExitCode::InvalidConfig
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_maps_to_exit_code_one() {
        let dir = tempfile::tempdir().unwrap();
        let error = Config::load(dir.path()).unwrap_err();
        assert_eq!(ExitCode::from(&error), ExitCode::MissingConfig);
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default_for(dir.path(), "bench-1");
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default_for(dir.path(), "bench-1");
        config.version = CURRENT_CONFIG_VERSION + 1;
        config.save(dir.path()).unwrap();

        let error = Config::load(dir.path()).unwrap_err();
        assert_eq!(ExitCode::from(&error), ExitCode::InvalidConfig);
    }
}
