//! Configuration
//!
//! Settings come from an optional JSON5 file (camelCase keys) overlaid by
//! environment variables. Every value has a default so the service starts in
//! the stock docker-compose layout with no configuration at all.

use crate::logging::{LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Keys whose values are hidden when the configuration is printed.
const SECRET_KEYS: &[&str] = &["token", "password"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub store: StoreConfig,
    pub mattermost: MattermostConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Poll store (Tarantool) connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// `host:port` of the IPROTO listener
    pub address: String,
    pub user: String,
    pub password: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Connection attempts at startup before giving up
    pub connect_attempts: u32,
    /// Pause between connection attempts in seconds
    pub reconnect_delay_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: "tarantool:3301".to_string(),
            user: "guest".to_string(),
            password: String::new(),
            timeout_secs: 10,
            connect_attempts: 5,
            reconnect_delay_secs: 2,
        }
    }
}

impl StoreConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Guest sessions need no AUTH request.
    pub fn requires_auth(&self) -> bool {
        !self.user.is_empty() && self.user != "guest"
    }
}

/// Mattermost API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MattermostConfig {
    /// Server base URL, without the `/api/v4` suffix
    pub server_url: String,
    /// Bot access token
    pub token: String,
    /// Bot account username
    pub username: String,
    /// Name of the team commands are registered in
    pub team: String,
}

impl Default for MattermostConfig {
    fn default() -> Self {
        Self {
            server_url: "http://host.docker.internal:8065".to_string(),
            token: String::new(),
            username: "pollbot".to_string(),
            team: "main".to_string(),
        }
    }
}

/// Webhook listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Host name Mattermost uses to reach this service
    pub callback_host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            callback_host: "host.docker.internal".to_string(),
            port: 8088,
        }
    }
}

impl ServerConfig {
    /// URL registered with Mattermost for every slash command.
    pub fn callback_url(&self) -> String {
        format!("http://{}:{}/commands", self.callback_host, self.port)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

impl Config {
    /// Load the optional file, then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Parse a JSON5 configuration file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        json5::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Override fields from environment variables. Empty values are ignored.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("TARANTOOL_ADDR") {
            self.store.address = v;
        }
        if let Some(v) = var("TARANTOOL_USER") {
            self.store.user = v;
        }
        if let Some(v) = var("TARANTOOL_PASSWORD") {
            self.store.password = v;
        }
        if let Some(v) = var("TARANTOOL_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_number("TARANTOOL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("TARANTOOL_CONNECT_ATTEMPTS") {
            self.store.connect_attempts = parse_number("TARANTOOL_CONNECT_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("TARANTOOL_RECONNECT_DELAY_SECS") {
            self.store.reconnect_delay_secs =
                parse_number("TARANTOOL_RECONNECT_DELAY_SECS", &v)?;
        }

        if let Some(v) = var("SERVER") {
            self.mattermost.server_url = v;
        }
        if let Some(v) = var("MM_TOKEN") {
            self.mattermost.token = v;
        }
        if let Some(v) = var("MM_USERNAME") {
            self.mattermost.username = v;
        }
        if let Some(v) = var("MM_TEAM") {
            self.mattermost.team = v;
        }

        if let Some(v) = var("HOST") {
            self.server.callback_host = v;
        }
        if let Some(v) = var("PORT") {
            self.server.port = parse_number("PORT", &v)?;
        }

        if let Some(v) = var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = var("LOG_FORMAT") {
            self.logging.format = v
                .parse::<LogFormat>()
                .map_err(|reason| ConfigError::InvalidValue {
                    key: "LOG_FORMAT",
                    value: v.clone(),
                    reason,
                })?;
        }

        Ok(self)
    }

    /// JSON view of the configuration with secrets masked.
    pub fn redacted(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        redact_secrets(&mut value);
        value
    }
}

fn parse_number<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                let is_secret = SECRET_KEYS.iter().any(|s| key.eq_ignore_ascii_case(s));
                if is_secret && v.as_str().is_some_and(|s| !s.is_empty()) {
                    *v = Value::String("[REDACTED]".to_string());
                } else {
                    redact_secrets(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}
