//! Configuration Manager

use super::{Config, ProxyKind};
use crate::connector::{ProxyConnector, TcpDialer};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::time::Duration;

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config
                .validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load the configuration file layered over environment variables
    pub fn load(path: &Path) -> Result<Config> {
        Self::load_layered(path, |name| std::env::var(name).ok())
    }

    /// Defaults, then the variable lookup, then whatever the file sets.
    ///
    /// A missing file leaves the lookup's values in place.
    pub fn load_layered<F>(path: &Path, lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        apply_vars(&mut config, &lookup)?;

        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let file: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            let mut merged: toml::Table = toml::from_str(&toml::to_string(&config)?)?;
            merge_tables(&mut merged, file);
            config = toml::Value::Table(merged)
                .try_into()
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        } else {
            tracing::debug!("No configuration file at {}", path.display());
        }

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        Self::load_from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup, starting from defaults
    pub fn load_from_vars<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        apply_vars(&mut config, &lookup)?;
        config.validate()?;
        Ok(config)
    }
}

/// Overlay `SOCKTUNNEL_*` variables onto `config`
fn apply_vars<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(kind) = lookup("SOCKTUNNEL_PROXY_TYPE") {
        config.proxy.kind = kind
            .parse::<ProxyKind>()
            .with_context(|| format!("Invalid SOCKTUNNEL_PROXY_TYPE: {}", kind))?;
    }

    if let Some(addr) = lookup("SOCKTUNNEL_PROXY_ADDR") {
        config.proxy.address = addr;
    }

    if let Some(port) = lookup("SOCKTUNNEL_PROXY_PORT") {
        config.proxy.port = Some(
            port.parse::<u16>()
                .with_context(|| format!("Invalid SOCKTUNNEL_PROXY_PORT: {}", port))?,
        );
    }

    if let Some(rdns) = lookup("SOCKTUNNEL_PROXY_RDNS") {
        config.proxy.resolve_remotely = rdns
            .parse::<bool>()
            .with_context(|| format!("Invalid SOCKTUNNEL_PROXY_RDNS: {}", rdns))?;
    }

    if let Some(username) = lookup("SOCKTUNNEL_PROXY_USERNAME") {
        config.proxy.username = Some(username);
    }

    if let Some(password) = lookup("SOCKTUNNEL_PROXY_PASSWORD") {
        config.proxy.password = Some(password);
    }

    if let Some(timeout) = lookup("SOCKTUNNEL_CONNECT_TIMEOUT") {
        config.timeouts.connect_timeout = humantime::parse_duration(&timeout)
            .with_context(|| format!("Invalid SOCKTUNNEL_CONNECT_TIMEOUT: {}", timeout))?;
    }

    if let Some(timeout) = lookup("SOCKTUNNEL_HANDSHAKE_TIMEOUT") {
        config.timeouts.handshake_timeout = humantime::parse_duration(&timeout)
            .with_context(|| format!("Invalid SOCKTUNNEL_HANDSHAKE_TIMEOUT: {}", timeout))?;
    }

    if let Some(log_level) = lookup("SOCKTUNNEL_LOG_LEVEL") {
        config.logging.log_level = log_level;
    }

    Ok(())
}

/// Recursively copy `overlay` into `base`, keeping keys only `base` has
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(inner) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, inner);
                } else {
                    base.insert(key, toml::Value::Table(inner));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// Command-line values that take priority over file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub proxy_type: Option<String>,
    pub proxy_addr: Option<String>,
    pub proxy_port: Option<u16>,
    pub no_rdns: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub handshake_timeout: Option<Duration>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_proxy_config()
            .with_context(|| "Proxy configuration validation failed")?;

        self.validate_timeout_config()
            .with_context(|| "Timeout configuration validation failed")?;

        self.validate_logging_config()
            .with_context(|| "Logging configuration validation failed")?;

        Ok(())
    }

    /// Validate proxy configuration
    fn validate_proxy_config(&self) -> Result<()> {
        let proxy = &self.proxy;

        if proxy.kind != ProxyKind::None && proxy.address.is_empty() {
            bail!("proxy.address is required for proxy type '{}'", proxy.kind);
        }

        if proxy.port == Some(0) {
            bail!("proxy.port must be greater than 0");
        }

        if let Some(username) = &proxy.username {
            if username.len() > 255 {
                bail!("proxy.username exceeds 255 bytes");
            }
        }

        if let Some(password) = &proxy.password {
            if proxy.username.is_none() {
                bail!("proxy.password is set without proxy.username");
            }
            if password.len() > 255 {
                bail!("proxy.password exceeds 255 bytes");
            }
        }

        Ok(())
    }

    /// Validate timeout configuration
    fn validate_timeout_config(&self) -> Result<()> {
        for (name, value) in [
            ("connect_timeout", self.timeouts.connect_timeout),
            ("handshake_timeout", self.timeouts.handshake_timeout),
        ] {
            if value.is_zero() {
                bail!("{} must be greater than 0", name);
            }

            if value.as_secs() > 3600 {
                bail!("{} cannot exceed 1 hour", name);
            }
        }

        Ok(())
    }

    /// Validate logging configuration
    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.log_level.as_str()) {
            bail!("logging.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        Ok(())
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(&mut self, overrides: ConfigOverrides) -> Result<()> {
        if let Some(proxy_type) = overrides.proxy_type {
            self.proxy.kind = proxy_type
                .parse::<ProxyKind>()
                .with_context(|| format!("Invalid proxy type: {}", proxy_type))?;
            tracing::info!("CLI override: proxy type set to {}", self.proxy.kind);
        }

        if let Some(addr) = overrides.proxy_addr {
            tracing::info!("CLI override: proxy address set to {}", addr);
            self.proxy.address = addr;
        }

        if let Some(port) = overrides.proxy_port {
            self.proxy.port = Some(port);
            tracing::info!("CLI override: proxy port set to {}", port);
        }

        if overrides.no_rdns {
            self.proxy.resolve_remotely = false;
            tracing::info!("CLI override: destination names resolved locally");
        }

        if let Some(username) = overrides.username {
            self.proxy.username = Some(username);
            tracing::info!("CLI override: proxy username set");
        }

        if let Some(password) = overrides.password {
            self.proxy.password = Some(password);
        }

        if let Some(timeout) = overrides.connect_timeout {
            self.timeouts.connect_timeout = timeout;
            tracing::info!("CLI override: connect timeout set to {:?}", timeout);
        }

        if let Some(timeout) = overrides.handshake_timeout {
            self.timeouts.handshake_timeout = timeout;
            tracing::info!("CLI override: handshake timeout set to {:?}", timeout);
        }

        Ok(())
    }

    /// Build a connector from a snapshot of this configuration
    pub fn connector(&self) -> ProxyConnector {
        ProxyConnector::with_dialer(
            self.proxy.clone(),
            TcpDialer::new(Some(self.timeouts.connect_timeout)),
        )
        .with_handshake_timeout(Some(self.timeouts.handshake_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.proxy.kind, ProxyKind::None);
        assert!(config.proxy.resolve_remotely);
    }

    #[test]
    fn test_load_from_vars() {
        let config = ConfigManager::load_from_vars(vars(&[
            ("SOCKTUNNEL_PROXY_TYPE", "socks5"),
            ("SOCKTUNNEL_PROXY_ADDR", "10.0.0.1"),
            ("SOCKTUNNEL_PROXY_RDNS", "false"),
            ("SOCKTUNNEL_PROXY_USERNAME", "alice"),
            ("SOCKTUNNEL_PROXY_PASSWORD", "secret"),
            ("SOCKTUNNEL_HANDSHAKE_TIMEOUT", "5s"),
        ]))
        .unwrap();

        assert_eq!(config.proxy.kind, ProxyKind::Socks5);
        assert_eq!(config.proxy.address, "10.0.0.1");
        assert_eq!(config.proxy.effective_port(), Some(1080));
        assert!(!config.proxy.resolve_remotely);
        assert_eq!(config.proxy.credentials(), Some(("alice", "secret")));
        assert_eq!(config.timeouts.handshake_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_proxy_type_is_rejected() {
        let err = ConfigManager::load_from_vars(vars(&[("SOCKTUNNEL_PROXY_TYPE", "socks6")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("bad proxy type"));
    }

    #[test]
    fn test_proxy_without_address_is_invalid() {
        let mut config = Config::default();
        config.proxy.kind = ProxyKind::Http;
        assert!(config.validate().is_err());

        config.proxy.address = "proxy.local".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.proxy.effective_port(), Some(8080));
    }

    #[test]
    fn test_password_requires_username() {
        let mut config = Config::default();
        config.proxy.password = Some("secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let mut config = Config::default();
        config.timeouts.connect_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_overrides_take_priority() {
        let mut config = Config::default();
        config
            .merge_with_cli_args(ConfigOverrides {
                proxy_type: Some("socks4a".to_string()),
                proxy_addr: Some("127.0.0.1".to_string()),
                proxy_port: Some(9050),
                no_rdns: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.proxy.kind, ProxyKind::Socks4);
        assert_eq!(config.proxy.effective_port(), Some(9050));
        assert!(!config.proxy.resolve_remotely);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connector_snapshots_proxy_config() {
        let mut config = Config::default();
        config.proxy = ProxyConfig::socks5("127.0.0.1", None);
        let connector = config.connector();

        config.proxy.kind = ProxyKind::Http;
        assert_eq!(connector.config().kind, ProxyKind::Socks5);
    }
}
