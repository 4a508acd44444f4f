//! Configuration Module
//!
//! Handles configuration loading, validation, and the process-wide default proxy.

pub mod manager;
pub mod types;

use std::sync::OnceLock;

pub use manager::{ConfigManager, ConfigOverrides};
pub use types::*;

static DEFAULT_PROXY: OnceLock<ProxyConfig> = OnceLock::new();

/// Set the process-wide default proxy.
///
/// This can happen once; later calls hand the rejected config back.
pub fn set_default_proxy(config: ProxyConfig) -> Result<(), ProxyConfig> {
    DEFAULT_PROXY.set(config)
}

/// Snapshot of the default proxy, or a direct config when none was set
pub fn default_proxy() -> ProxyConfig {
    DEFAULT_PROXY.get().cloned().unwrap_or_default()
}
