use std::error::Error;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum LogLevel {
    #[serde(rename = "trace")]
    Trace,
    #[serde(rename = "debug")]
    Debug,
    #[default]
    #[serde(rename = "info")]
    Info,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl From<LogLevel> for Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        LevelFilter::from_level(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on for SOCKS5 clients.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Port to listen on for SOCKS5 clients.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            bind_port: default_bind_port(),
            log_level: LogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// The single upstream DNS server used to resolve CONNECT domain names.
    #[serde(default = "default_dns_server")]
    pub dns_server: SocketAddr,
    /// How long to wait for a DNS reply before giving up (no retries).
    #[serde(default = "default_dns_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dns_server: default_dns_server(),
            timeout_secs: default_dns_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub resolver: ResolverConfig,
}

fn decode_from_path(path: &str) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::NotFound)?;
    toml::from_str(&content).map_err(|e| ConfigError::Decode(e.message().into()))
}

/// Loads config from `config_path`, falling back to (and persisting) the
/// default configuration when no file exists there yet.
pub fn load_config(config_path: &str) -> anyhow::Result<Config> {
    match decode_from_path(config_path) {
        Ok(cfg) => Ok(cfg),
        Err(ConfigError::NotFound) => create_default_config(config_path),
        Err(ConfigError::Decode(e)) => Err(ConfigError::Decode(e).into()),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    NotFound,
    Decode(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => f.write_str("config file not found"),
            Self::Decode(e) => f.write_str(e),
        }
    }
}

impl Error for ConfigError {}

fn create_default_config(config_path: &str) -> anyhow::Result<Config> {
    let cfg = Config::default();
    let toml_str = toml::to_string_pretty(&cfg)?;
    std::fs::write(config_path, toml_str)?;
    Ok(cfg)
}

fn default_bind_addr() -> String {
    "0.0.0.0".into()
}

fn default_bind_port() -> u16 {
    1080
}

fn default_dns_server() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 53))
}

fn default_dns_timeout_secs() -> u64 {
    5
}
