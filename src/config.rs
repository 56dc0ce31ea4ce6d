//! Tool configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via PROTOGEN_CONFIG or --config)
//! 3. Environment variables

use protogen_codec::{FlagPolicy, TextOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema configuration.
    pub schema: SchemaConfig,
    /// Text codec options.
    pub text: TextOptions,
}

impl Config {
    /// Loads configuration from `path` if given, then applies environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.schema.apply_env_overrides();

        if let Ok(policy) = std::env::var("PROTOGEN_UNKNOWN_FLAGS") {
            match policy.parse::<FlagPolicy>() {
                Ok(policy) => self.text.unknown_flags = policy,
                Err(e) => tracing::warn!("Ignoring PROTOGEN_UNKNOWN_FLAGS: {}", e),
            }
        }

        if let Ok(strict) = std::env::var("PROTOGEN_STRICT_RECORDS") {
            self.text.strict_records = strict == "1" || strict.to_lowercase() == "true";
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schema.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                setting: "schema.path",
                reason: "must name the protocol schema file".to_string(),
            });
        }
        Ok(())
    }
}

/// Schema configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Path to the protocol YAML file.
    pub path: PathBuf,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("protocol.yaml"),
        }
    }
}

impl SchemaConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PROTOGEN_SCHEMA") {
            self.path = PathBuf::from(path);
        }
    }
}

/// Error loading the tool configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    Read(PathBuf, std::io::Error),
    /// The config file is not valid YAML for [`Config`].
    Parse(PathBuf, String),
    /// A setting has an unusable value.
    Invalid { setting: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(path, e) => {
                write!(f, "cannot read protogen config {}: {}", path.display(), e)
            }
            ConfigError::Parse(path, e) => {
                write!(f, "protogen config {} is malformed: {}", path.display(), e)
            }
            ConfigError::Invalid { setting, reason } => {
                write!(f, "protogen setting '{}' {}", setting, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read(_, e) => Some(e),
            _ => None,
        }
    }
}
