//! Process-wide configuration, established once at start-up.
//!
//! Values come from an optional YAML file named by `TURNSTILE_CONFIG`,
//! overridden by `LISTEN_HOST`, `LISTEN_PORT` and `HTTPS`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid port: {value:?}")]
    InvalidPort { value: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bind host, also exposed to applications as the server name
    pub host: String,
    /// Bind port; 0 picks an ephemeral port
    pub port: u16,
    /// Whether the transport below us is secured (selects the https scheme)
    pub secure: bool,
    /// Upper bound on a single readiness wait, in milliseconds
    pub poll_timeout_ms: u64,
    /// Bytes requested per read call
    pub read_chunk: usize,
    /// Largest request head accepted before the connection is aborted
    pub max_head_bytes: usize,
    /// Copy the process environment into every request environment
    pub inherit_env: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            secure: false,
            poll_timeout_ms: 1000,
            read_chunk: 1024,
            max_head_bytes: 64 * 1024,
            inherit_env: true,
        }
    }
}

impl Config {
    /// Loads configuration from the real process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration using `lookup` in place of the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = match lookup("TURNSTILE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(host) = lookup("LISTEN_HOST") {
            cfg.host = host;
        }
        if let Some(port) = lookup("LISTEN_PORT") {
            cfg.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { value: port })?;
        }
        if let Some(https) = lookup("HTTPS") {
            cfg.secure = matches!(https.as_str(), "on" | "1");
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    /// Rejects values the reactor cannot run with.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.read_chunk == 0 {
            return Err(ConfigError::Invalid {
                reason: "read_chunk must be positive",
            });
        }
        if self.max_head_bytes == 0 {
            return Err(ConfigError::Invalid {
                reason: "max_head_bytes must be positive",
            });
        }
        Ok(())
    }
}
