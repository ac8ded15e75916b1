// ABOUTME: Configuration file handling for connection profiles and clone settings
// ABOUTME: Reads TOML from --config or MONGO_CLONER_CONFIG; a missing file means defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::cloning::DEFAULT_BATCH_SIZE;
use crate::error::{ClonerError, Result};
use crate::store::ConnectionDescriptor;

pub const CONFIG_ENV_VAR: &str = "MONGO_CLONER_CONFIG";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionProfile {
    pub uri: String,
    pub app_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CloneSettings {
    pub batch_size: usize,
    pub poll_interval_ms: u64,
}

impl Default for CloneSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connections: BTreeMap<String, ConnectionProfile>,
    #[serde(rename = "clone")]
    pub cloning: CloneSettings,
}

impl Config {
    /// Loads the file at `path`, else the one named by `MONGO_CLONER_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        };
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        if config.cloning.batch_size == 0 {
            bail!("clone.batch_size must be at least 1");
        }
        Ok(config)
    }

    /// Resolves a profile name, or accepts anything with a scheme as a literal URI.
    pub fn resolve(&self, name_or_uri: &str) -> Result<ConnectionDescriptor> {
        if let Some(profile) = self.connections.get(name_or_uri) {
            let descriptor = ConnectionDescriptor::new(profile.uri.clone());
            return Ok(match &profile.app_name {
                Some(app_name) => descriptor.with_app_name(app_name.clone()),
                None => descriptor,
            });
        }
        if name_or_uri.contains("://") {
            return Ok(ConnectionDescriptor::new(name_or_uri));
        }
        Err(ClonerError::InvalidInput(format!(
            "'{}' is neither a connection profile nor a connection string",
            name_or_uri
        )))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cloning.poll_interval_ms)
    }
}
