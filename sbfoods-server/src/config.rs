//! Server configuration
//!
//! Values normally arrive from the environment through the `sbfoods` binary
//! (see `sbfoods-cli`), but every type here can be built directly, which is
//! what the tests do.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default listening port
pub const DEFAULT_PORT: u16 = 5000;

/// Request body cap for JSON and URL-encoded payloads (10 MB)
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Origins accepted by CORS outside production
pub const DEVELOPMENT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://localhost:5173"];

/// Fixed rate limit window
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Requests allowed per client IP inside one window
pub const RATE_LIMIT_MAX_REQUESTS: u32 = 100;

/// Message returned once a client exceeds its quota
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Default server selection timeout for the startup ping
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid origin '{value}': {reason}")]
    InvalidOrigin { value: String, reason: String },
}

/// Deployment environment, taken from `NODE_ENV`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    /// Any other name (e.g. `test`, `staging`). Treated as non-production
    /// and without request logging.
    Other(String),
    /// `NODE_ENV` not set at all. Behaves like [`Environment::Other`].
    #[default]
    Unset,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value {
            "development" => Self::Development,
            "production" => Self::Production,
            other => Self::Other(other.to_string()),
        }
    }

    /// `None` when the variable is absent
    pub fn from_name(value: Option<&str>) -> Self {
        value.map_or(Self::Unset, Self::parse)
    }

    /// Raw `NODE_ENV` value, `None` when unset
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Development => Some("development"),
            Self::Production => Some("production"),
            Self::Other(name) => Some(name),
            Self::Unset => None,
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("unset"))
    }
}

/// Database settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// MongoDB connection string. `None` fails the connector, not config loading.
    pub uri: Option<String>,
    /// Server selection timeout used when the URI does not set one
    pub connect_timeout: Duration,
    /// Application name reported to the server
    pub app_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            app_name: "sbfoods-api".to_string(),
        }
    }
}

/// Per-IP fixed window quota
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
    pub message: &'static str,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: RATE_LIMIT_WINDOW,
            max_requests: RATE_LIMIT_MAX_REQUESTS,
            message: RATE_LIMIT_MESSAGE,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub environment: Environment,
    pub database: DatabaseConfig,
    /// Origins allowed by CORS in production
    pub frontend_origins: Vec<String>,
    /// Directory served under `/uploads`
    pub uploads_dir: PathBuf,
    pub rate_limit: RateLimitConfig,
    pub body_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            environment: Environment::default(),
            database: DatabaseConfig::default(),
            frontend_origins: Vec::new(),
            uploads_dir: PathBuf::from("uploads"),
            rate_limit: RateLimitConfig::default(),
            body_limit: BODY_LIMIT_BYTES,
        }
    }
}

impl AppConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Origins CORS accepts for the configured environment
    pub fn allowed_origins(&self) -> Vec<String> {
        if self.environment.is_production() {
            self.frontend_origins.clone()
        } else {
            DEVELOPMENT_ORIGINS.iter().map(|o| o.to_string()).collect()
        }
    }
}

/// Split a comma separated `FRONTEND_URL` value into normalized origins.
///
/// Trailing slashes are dropped since browsers never send them in `Origin`.
pub fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|value| {
            let url = url::Url::parse(value).map_err(|e| ConfigError::InvalidOrigin {
                value: value.to_string(),
                reason: e.to_string(),
            })?;
            if url.host_str().is_none() {
                return Err(ConfigError::InvalidOrigin {
                    value: value.to_string(),
                    reason: "missing host".to_string(),
                });
            }
            Ok(url.origin().ascii_serialization())
        })
        .collect()
}
