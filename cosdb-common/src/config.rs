//! Configuration loading for the import client
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and defaults apply.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_NOTICE_TTL_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_API_URL: &str = "COSDB_API_URL";
pub const ENV_ACCESS_TOKEN: &str = "COSDB_ACCESS_TOKEN";
pub const ENV_POLL_INTERVAL_MS: &str = "COSDB_POLL_INTERVAL_MS";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Backend API base URL, including the `/api` prefix
    #[serde(default)]
    pub api_url: Option<String>,

    /// Session access token sent as `Authorization: Bearer`
    #[serde(default)]
    pub access_token: Option<String>,

    /// Job status poll period
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// How long a transient notice stays visible
    #[serde(default)]
    pub notice_ttl_secs: Option<u64>,

    /// Per-request HTTP timeout
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Where downloaded templates are saved
    #[serde(default)]
    pub download_dir: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Command-line overrides (highest priority)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub access_token: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub download_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Fully resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub notice_ttl: Duration,
    pub request_timeout: Duration,
    pub download_dir: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            notice_ttl: Duration::from_secs(DEFAULT_NOTICE_TTL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            download_dir: default_download_dir(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Resolve configuration from CLI overrides, environment, and TOML
    pub fn resolve(overrides: &ConfigOverrides, toml: TomlConfig) -> Result<Self> {
        let defaults = ClientConfig::default();

        let api_url = overrides
            .api_url
            .clone()
            .or_else(|| non_empty_env(ENV_API_URL))
            .or(toml.api_url)
            .unwrap_or(defaults.api_url);
        let api_url = normalize_api_url(&api_url)?;

        let access_token = overrides
            .access_token
            .clone()
            .or_else(|| non_empty_env(ENV_ACCESS_TOKEN))
            .or(toml.access_token)
            .filter(|t| !t.trim().is_empty());

        let poll_interval_ms = match overrides.poll_interval_ms {
            Some(ms) => Some(ms),
            None => match non_empty_env(ENV_POLL_INTERVAL_MS) {
                Some(raw) => Some(raw.parse::<u64>().map_err(|e| {
                    Error::Config(format!("{} must be an integer: {}", ENV_POLL_INTERVAL_MS, e))
                })?),
                None => toml.poll_interval_ms,
            },
        };
        let poll_interval = match poll_interval_ms {
            Some(0) => return Err(Error::Config("poll interval must be positive".to_string())),
            Some(ms) => Duration::from_millis(ms),
            None => defaults.poll_interval,
        };

        let notice_ttl = toml
            .notice_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.notice_ttl);
        let request_timeout = toml
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let download_dir = overrides
            .download_dir
            .clone()
            .or(toml.download_dir)
            .unwrap_or(defaults.download_dir);

        let mut logging = toml.logging;
        if let Some(level) = &overrides.log_level {
            logging.level = level.clone();
        }

        Ok(Self {
            api_url,
            access_token,
            poll_interval,
            notice_ttl,
            request_timeout,
            download_dir,
            logging,
        })
    }
}

/// Load TOML config from `path`; a missing file yields defaults
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found: {} (using defaults)", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Default config file location: `<config_dir>/cosdb/import.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cosdb").join("import.toml"))
}

/// Default template download directory
fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Trim whitespace and trailing slashes; require an http(s) scheme
fn normalize_api_url(raw: &str) -> Result<String> {
    let url = raw.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "API URL must start with http:// or https://: {}",
            raw
        )));
    }
    Ok(url.to_string())
}
