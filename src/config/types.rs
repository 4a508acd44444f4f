//! Configuration Types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{GeneralKind, ProxyError};
use crate::protocol::constants::{DEFAULT_HTTP_PORT, DEFAULT_SOCKS_PORT};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub timeouts: TimeoutConfig,
    pub logging: LoggingConfig,
}

/// Which intermediary, if any, a tunnel goes through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Connect straight to the destination
    #[default]
    #[serde(alias = "direct")]
    None,
    /// SOCKS4, upgraded to SOCKS4a for unresolved names
    #[serde(alias = "socks4a")]
    Socks4,
    Socks5,
    /// HTTP CONNECT
    Http,
}

impl ProxyKind {
    /// Port used when the configuration leaves it out
    pub fn default_port(self) -> Option<u16> {
        match self {
            ProxyKind::None => None,
            ProxyKind::Socks4 | ProxyKind::Socks5 => Some(DEFAULT_SOCKS_PORT),
            ProxyKind::Http => Some(DEFAULT_HTTP_PORT),
        }
    }
}

impl FromStr for ProxyKind {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "direct" => Ok(ProxyKind::None),
            "socks4" | "socks4a" => Ok(ProxyKind::Socks4),
            "socks5" => Ok(ProxyKind::Socks5),
            "http" => Ok(ProxyKind::Http),
            _ => Err(ProxyError::General(GeneralKind::BadProxyType)),
        }
    }
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyKind::None => "none",
            ProxyKind::Socks4 => "socks4",
            ProxyKind::Socks5 => "socks5",
            ProxyKind::Http => "http",
        };
        f.write_str(name)
    }
}

/// Proxy configuration.
///
/// Connectors take their own copy, so changing a `ProxyConfig` after a
/// connector was built never affects it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub kind: ProxyKind,
    /// Proxy host name or IP; unused for `ProxyKind::None`
    pub address: String,
    pub port: Option<u16>,
    /// Let the proxy resolve destination names (SOCKS4a, SOCKS5 domain, HTTP)
    pub resolve_remotely: bool,
    /// SOCKS5 / HTTP user name, SOCKS4 user-id
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            kind: ProxyKind::None,
            address: String::new(),
            port: None,
            resolve_remotely: true,
            username: None,
            password: None,
        }
    }
}

impl ProxyConfig {
    /// No proxy at all
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn socks4(address: impl Into<String>, port: Option<u16>) -> Self {
        Self::with_kind(ProxyKind::Socks4, address, port)
    }

    pub fn socks5(address: impl Into<String>, port: Option<u16>) -> Self {
        Self::with_kind(ProxyKind::Socks5, address, port)
    }

    pub fn http(address: impl Into<String>, port: Option<u16>) -> Self {
        Self::with_kind(ProxyKind::Http, address, port)
    }

    fn with_kind(kind: ProxyKind, address: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            kind,
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// SOCKS4 user-id
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.username = Some(user_id.into());
        self
    }

    /// Resolve destination names before contacting the proxy
    pub fn resolve_locally(mut self) -> Self {
        self.resolve_remotely = false;
        self
    }

    /// Configured port, else the kind's default
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.kind.default_port())
    }

    /// Username and password, only when both are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Limit on opening the TCP connection to the proxy or destination
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Limit on the whole proxy handshake
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
