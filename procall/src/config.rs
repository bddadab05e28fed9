//! On-disk configuration.
//!
//! Looked up in `$PROCALL_CONFIG`, then `<config dir>/procall/config.json`.
//! A missing file means defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PROCALL_CONFIG";

const CONFIG_FILE: &str = "config.json";

/// Defaults applied to every command created by a [`Shell`](crate::Shell).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trace every session.
    pub debug: bool,
    /// Variables added to every child's environment.
    pub env: HashMap<String, String>,
    /// Variables removed from every child's environment.
    pub env_remove: Vec<String>,
    /// Start children from an empty environment.
    pub env_clear: bool,
    /// Working directory for children.
    pub working_dir: Option<PathBuf>,
    /// Extra names that must never resolve to commands.
    pub reserved: Vec<String>,
}

impl Config {
    /// Load the config from its default location.
    pub fn load() -> Result<Self> {
        match default_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load the config from an explicit file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where [`Config::load`] looks.
pub fn default_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("procall").join(CONFIG_FILE))
}
