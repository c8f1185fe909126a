//! Configuration management for ChatRelay
//!
//! Configuration is layered: YAML file, then environment, then CLI flags,
//! with later layers winning. A missing file at the default path is fine
//! (everything has a default); an explicitly requested file that does not
//! exist is an error.

use crate::cli::Cli;
use crate::error::{ChatRelayError, Result};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Upstream Ollama server settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Proxy server settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Conversation storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Settings for the upstream Ollama server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_upstream_url")]
    pub url: String,
    /// Resolve the upstream from the x-ollama-url request header instead
    /// of the fixed URL (proxy only)
    #[serde(default)]
    pub resolve_from_header: bool,
}

/// Settings for the proxy server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Settings for conversation storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store directory; platform data dir when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_upstream_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            resolve_from_header: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, applying CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Explicit config path; `None` tries the default location
    /// * `cli` - Parsed command line, whose flags override the file
    ///
    /// # Errors
    ///
    /// Returns error if an explicitly given file is missing or
    /// unparseable, or if the merged configuration fails validation
    pub fn load(path: Option<&Path>, cli: &Cli) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ChatRelayError::Config(format!(
                        "Config file not found: {}",
                        p.display()
                    ))
                    .into());
                }
                Self::from_file(p)?
            }
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        if let Some(url) = &cli.url {
            config.upstream.url = url.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate the merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the upstream URL or bind address is malformed
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.upstream.url).map_err(|e| {
            ChatRelayError::Config(format!(
                "Invalid upstream URL '{}': {}",
                self.upstream.url, e
            ))
        })?;
        if parsed.host_str().is_none() {
            return Err(ChatRelayError::Config(format!(
                "Upstream URL '{}' has no host",
                self.upstream.url
            ))
            .into());
        }

        self.server
            .bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                ChatRelayError::Config(format!(
                    "Invalid bind address '{}': {}",
                    self.server.bind, e
                ))
            })?;

        Ok(())
    }
}
