//! SockTunnel - proxy tunnel probe
//!
//! Opens one tunnel to a destination through the configured proxy, reports
//! what the proxy negotiated, and closes it again.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use socktunnel::config::{ConfigManager, ConfigOverrides};

/// CLI arguments for SockTunnel
#[derive(Parser, Debug)]
#[command(name = "socktunnel")]
#[command(about = "SockTunnel - open a tunnel through a SOCKS4/4a, SOCKS5 or HTTP CONNECT proxy")]
#[command(version)]
#[command(long_about = "
SockTunnel - open a tunnel through a SOCKS4/4a, SOCKS5 or HTTP CONNECT proxy

Connects to HOST:PORT through the configured proxy, prints the address the
proxy bound and the peer it was asked for, then closes the connection.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SOCKTUNNEL_PROXY_TYPE         - none, socks4, socks4a, socks5 or http
  SOCKTUNNEL_PROXY_ADDR         - Proxy host name or IP
  SOCKTUNNEL_PROXY_PORT         - Proxy port (default 1080 for SOCKS, 8080 for HTTP)
  SOCKTUNNEL_PROXY_RDNS         - Let the proxy resolve names (true/false)
  SOCKTUNNEL_PROXY_USERNAME     - SOCKS5/HTTP user name, SOCKS4 user-id
  SOCKTUNNEL_PROXY_PASSWORD     - SOCKS5/HTTP password
  SOCKTUNNEL_CONNECT_TIMEOUT    - TCP connect timeout (e.g., 10s)
  SOCKTUNNEL_HANDSHAKE_TIMEOUT  - Proxy handshake timeout (e.g., 30s)
  SOCKTUNNEL_LOG_LEVEL          - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Destination host (IPv4 literal or DNS name)
    pub host: Option<String>,

    /// Destination port
    pub port: Option<u16>,

    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "socktunnel.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Proxy type (overrides config file)
    #[arg(short = 't', long, help = "Proxy type: none, socks4, socks4a, socks5, http")]
    pub proxy_type: Option<String>,

    /// Proxy address (overrides config file)
    #[arg(short = 'a', long, help = "Proxy host name or IP")]
    pub proxy_addr: Option<String>,

    /// Proxy port (overrides config file)
    #[arg(short = 'p', long, help = "Proxy port")]
    pub proxy_port: Option<u16>,

    /// Resolve destination names locally
    #[arg(long, help = "Resolve destination names locally instead of at the proxy")]
    pub no_rdns: bool,

    #[arg(short, long, help = "Proxy user name (SOCKS4 user-id)")]
    pub username: Option<String>,

    #[arg(long, help = "Proxy password")]
    pub password: Option<String>,

    #[arg(long, value_parser = humantime::parse_duration, help = "TCP connect timeout (e.g., 10s)")]
    pub connect_timeout: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration, help = "Proxy handshake timeout (e.g., 30s)")]
    pub handshake_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Print the negotiation result as JSON
    #[arg(long, help = "Print the negotiation result as JSON")]
    pub json: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > environment > defaults
    let mut config = ConfigManager::load(&args.config)?;

    if let Some(log_level) = &args.log_level {
        config.logging.log_level = log_level.clone();
    }

    init_tracing(&args, &config.logging.log_level)?;

    info!("Starting SockTunnel v{}", env!("CARGO_PKG_VERSION"));

    config.merge_with_cli_args(ConfigOverrides {
        proxy_type: args.proxy_type.clone(),
        proxy_addr: args.proxy_addr.clone(),
        proxy_port: args.proxy_port,
        no_rdns: args.no_rdns,
        username: args.username.clone(),
        password: args.password.clone(),
        connect_timeout: args.connect_timeout,
        handshake_timeout: args.handshake_timeout,
    })?;

    // Final validation after all overrides
    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        info!("  Proxy type: {}", config.proxy.kind);
        if let Some(port) = config.proxy.effective_port() {
            info!("  Proxy address: {}:{}", config.proxy.address, port);
        }
        info!("  Remote DNS: {}", config.proxy.resolve_remotely);
        info!("  Connect timeout: {:?}", config.timeouts.connect_timeout);
        info!("  Handshake timeout: {:?}", config.timeouts.handshake_timeout);
        return Ok(());
    }

    let (host, port) = match (args.host.as_deref(), args.port) {
        (Some(host), Some(port)) => (host, port),
        _ => anyhow::bail!("HOST and PORT are required unless --validate-config is given"),
    };

    let connector = config.connector();
    let mut stream = match connector.connect(host, port).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Could not open tunnel to {}:{}: {}", host, port, e);
            return Err(e).with_context(|| format!("Tunnel to {}:{} failed", host, port));
        }
    };

    let (peer_address, peer_port) = stream.peer();
    if args.json {
        let report = serde_json::json!({
            "proxy_type": config.proxy.kind.to_string(),
            "proxy_peer": stream.proxy_peer_addr().ok().map(|addr| addr.to_string()),
            "negotiation": stream.negotiation(),
            "peer_address": peer_address,
            "peer_port": peer_port,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match stream.proxy_bound_addr() {
            Some((address, bound_port)) => println!("Proxy bound: {}:{}", address, bound_port),
            None => println!("Direct connection (no proxy)"),
        }
        println!("Peer: {}:{}", peer_address, peer_port);
        if let Ok(addr) = stream.proxy_peer_addr() {
            println!("Connected socket: {}", addr);
        }
    }

    stream.shutdown().await.ok();
    info!("Tunnel closed");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, configured_level: &str) -> Result<()> {
    let log_level = if args.verbose { "debug" } else { configured_level };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();

    Ok(())
}
