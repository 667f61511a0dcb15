// Runtime configuration
// Every setting has a default, so the server runs with no environment at all.

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BILLING_PROJECT: &str = "analise-dados-tse";
pub const DEFAULT_CREDENTIALS_PATH: &str = "/etc/secrets/gcp_credentials.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STATIC_ROOT: &str = "web";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub billing_project: String,
    pub credentials_path: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub static_root: PathBuf,
    pub log_format: LogFormat,
    pub bigquery_api_base: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            billing_project: DEFAULT_BILLING_PROJECT.to_string(),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            port: DEFAULT_PORT,
            static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
            log_format: LogFormat::Text,
            bigquery_api_base: crate::warehouse::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Config {
    /// Read configuration from the process environment (and `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => defaults.port,
        };

        let log_format = match get("LOG_FORMAT").map(|v| v.trim().to_ascii_lowercase()) {
            None => defaults.log_format,
            Some(v) if v == "text" => LogFormat::Text,
            Some(v) if v == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other,
                })
            }
        };

        Ok(Self {
            billing_project: get("BILLING_PROJECT_ID").unwrap_or(defaults.billing_project),
            credentials_path: get("CREDENTIALS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_path),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port,
            static_root: get("STATIC_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_root),
            log_format,
            bigquery_api_base: get("BIGQUERY_API_BASE").unwrap_or(defaults.bigquery_api_base),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.bind_addr, self.port);
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "BIND_ADDR",
            value: raw,
        })
    }
}
