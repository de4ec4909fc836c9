use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stash_types::Limits;

/// File looked for in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "stash.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Snapshot file of the file backend.
    pub data_path: PathBuf,
    /// Size limits and iterator page size.
    pub limits: Limits,
    /// TTL applied to singleton writes when `--ttl` is not given.
    pub default_ttl_secs: Option<u64>,
    /// Shard singletons unless told otherwise.
    pub sharded: bool,
    /// Report missing singletons as errors instead of empty reads.
    pub err_if_not_found: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("stash.json"),
            limits: Limits::default(),
            default_ttl_secs: None,
            sharded: false,
            err_if_not_found: false,
        }
    }
}

impl CliConfig {
    /// Load and validate the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given; otherwise [`DEFAULT_CONFIG_FILE`] if it
    /// exists; otherwise the defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let l = &self.limits;
        if l.page_size == 0 {
            return Err(ConfigError::Invalid("limits.page_size must be positive".into()));
        }
        if l.chunk_size == 0 || l.max_chunks == 0 {
            return Err(ConfigError::Invalid(
                "limits.chunk_size and limits.max_chunks must be positive".into(),
            ));
        }
        if l.chunk_size.checked_mul(l.max_chunks).is_none() {
            return Err(ConfigError::Invalid(
                "limits.chunk_size * limits.max_chunks overflows".into(),
            ));
        }
        if l.item_ceiling == 0 {
            return Err(ConfigError::Invalid("limits.item_ceiling must be positive".into()));
        }
        Ok(())
    }
}
