//! Configuration for the temporal-mcp server.
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config/temporal-mcp.{yaml,toml,json}` if present
//! 3. `TEMPORAL_MCP__SECTION__KEY` environment variables
//! 4. The flat variables `TEMPORAL_ADDRESS`, `TEMPORAL_NAMESPACE`, `PORT`
//!    and `INSTRUCTIONS_PATH`
//!
//! A `.env` file in the working directory is loaded before anything else.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Guide for reading normalized histories, used when no file is configured.
pub const DEFAULT_INSTRUCTIONS: &str = include_str!("../instructions.txt");

pub const DEFAULT_CONFIG_FILE: &str = "config/temporal-mcp";
const ENV_PREFIX: &str = "TEMPORAL_MCP";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to read instructions from {}: {source}", path.display())]
    Instructions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub temporal: TemporalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    /// Path to the history-reading guide. Falls back to the embedded copy.
    #[serde(default)]
    pub instructions_path: Option<PathBuf>,
}

/// Connection to the Temporal frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// HTTP API address; a bare `host:port` is treated as `http://host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Maximum events per history page; 0 lets the server decide.
    #[serde(default)]
    pub page_size: u32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            namespace: default_namespace(),
            request_timeout_secs: default_request_timeout(),
            page_size: 0,
        }
    }
}

/// HTTP transport listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Failure scan tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Executions drained at once. 1 means strictly sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_address() -> String {
    "http://localhost:7243".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_concurrency() -> usize {
    1
}

fn flat_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

impl AppConfig {
    /// Load configuration from `.env`, the default config file and the
    /// environment, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is not an error.
        let _ = dotenvy::dotenv();
        Self::load_from(Some(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration using `file` (with or without extension) as the
    /// optional file source.
    pub fn load_from(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("temporal.address", default_address())?
            .set_default("temporal.namespace", default_namespace())?
            .set_default("temporal.request_timeout_secs", 30)?
            .set_default("temporal.page_size", 0)?
            .set_default("server.host", default_host())?
            .set_default("server.port", 8080)?
            .set_default("scan.concurrency", 1)?;

        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file).required(false));
        }

        let mut app_config: AppConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        app_config.apply_env_overrides()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Apply the flat environment variables the server has always honored.
    /// Unset and empty variables leave the loaded value in place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(address) = flat_var("TEMPORAL_ADDRESS") {
            self.temporal.address = address;
        }
        if let Some(namespace) = flat_var("TEMPORAL_NAMESPACE") {
            self.temporal.namespace = namespace;
        }
        if let Some(port) = flat_var("PORT") {
            self.server.port = port.parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                message: format!("{port:?}: {e}"),
            })?;
        }
        if let Some(path) = flat_var("INSTRUCTIONS_PATH") {
            self.instructions_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check required values are present and in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temporal.address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "temporal.address",
                message: "must not be empty".to_string(),
            });
        }
        if self.temporal.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "temporal.namespace",
                message: "must not be empty".to_string(),
            });
        }
        if self.scan.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "scan.concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Read the history-reading guide.
    pub fn load_instructions(&self) -> Result<String, ConfigError> {
        match &self.instructions_path {
            Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Instructions {
                path: path.clone(),
                source,
            }),
            None => Ok(DEFAULT_INSTRUCTIONS.to_string()),
        }
    }
}
