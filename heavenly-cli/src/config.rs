//! Session file parsing (`heavenly.yml`)

use crate::library::Library;
use heavenly_membrane::HostValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Link `{name}` cannot be converted to a host value: {message}")]
    InvalidLink { name: String, message: String },

    #[error("Literal cannot be converted to a host value: {0}")]
    InvalidLiteral(#[from] serde_json::Error),
}

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Built-in host libraries to link, by name
    #[serde(default)]
    pub library: Vec<Library>,

    /// Extra globals linked from YAML literals
    #[serde(default)]
    pub links: BTreeMap<String, serde_yaml::Value>,

    /// Sandbox procedures the host may call after the script has run
    #[serde(default)]
    pub exports: Vec<String>,

    /// Calls made, in order, once the script has run
    #[serde(default)]
    pub invoke: Vec<Invocation>,

    /// Root key receiving the receiver of exported calls
    #[serde(default)]
    pub this_key: Option<String>,

    #[serde(skip)]
    config_path: Option<PathBuf>,
}

/// One host -> sandbox call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub procedure: String,

    #[serde(default)]
    pub args: Vec<serde_yaml::Value>,

    #[serde(default)]
    pub this: Option<serde_yaml::Value>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;

        // Store config file path for relative path resolution
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to an empty session
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve a path relative to the config file location
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(parent) = self.config_path.as_deref().and_then(Path::parent) {
            parent.join(path)
        } else {
            path.to_path_buf()
        }
    }

    /// Every procedure the session must export: the declared ones plus
    /// anything named by an invocation
    pub fn all_exports(&self) -> Vec<String> {
        let mut exports = self.exports.clone();
        for invocation in &self.invoke {
            if !exports.contains(&invocation.procedure) {
                exports.push(invocation.procedure.clone());
            }
        }
        exports
    }

    /// Host values for the configured links, in name order
    pub fn link_values(&self) -> Result<Vec<(String, HostValue)>, ConfigError> {
        self.links
            .iter()
            .map(|(name, literal)| {
                let value = yaml_to_host(literal).map_err(|err| ConfigError::InvalidLink {
                    name: name.clone(),
                    message: err.to_string(),
                })?;
                Ok((name.clone(), value))
            })
            .collect()
    }
}

/// Convert a YAML literal through JSON into a host value
pub fn yaml_to_host(literal: &serde_yaml::Value) -> Result<HostValue, ConfigError> {
    let json = serde_json::to_value(literal)?;
    Ok(HostValue::from_json(&json))
}
