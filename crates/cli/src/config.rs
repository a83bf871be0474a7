//! Server configuration: defaults, optional TOML file, then environment and
//! command-line values (clap folds `TRACECHAIN_*` variables into the flags).

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default listen port.
pub(crate) const DEFAULT_PORT: u16 = 8000;

/// Default rate limit: 60 requests per minute per IP.
pub(crate) const DEFAULT_RATE_LIMIT: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("error reading config '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("error parsing config '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Keys accepted in the TOML config file. All optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) port: Option<u16>,
    pub(crate) data: Option<PathBuf>,
    pub(crate) rate_limit: Option<u64>,
    pub(crate) api_key: Option<String>,
}

impl FileConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub(crate) struct ServeOverrides {
    pub(crate) port: Option<u16>,
    pub(crate) data: Option<PathBuf>,
    pub(crate) rate_limit: Option<u64>,
    pub(crate) api_key: Option<String>,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ServeConfig {
    pub(crate) port: u16,
    /// Journal file; `None` keeps everything in memory.
    pub(crate) data: Option<PathBuf>,
    pub(crate) rate_limit: u64,
    /// `None` disables authentication.
    pub(crate) api_key: Option<String>,
}

impl ServeConfig {
    pub(crate) fn resolve(file: FileConfig, overrides: ServeOverrides) -> Self {
        ServeConfig {
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            data: overrides.data.or(file.data),
            rate_limit: overrides
                .rate_limit
                .or(file.rate_limit)
                .unwrap_or(DEFAULT_RATE_LIMIT),
            api_key: overrides
                .api_key
                .or(file.api_key)
                .filter(|k| !k.is_empty()),
        }
    }

    pub(crate) fn load(
        config_path: Option<&Path>,
        overrides: ServeOverrides,
    ) -> Result<Self, ConfigError> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(file, overrides))
    }
}
