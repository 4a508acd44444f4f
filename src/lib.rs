//! SockTunnel Library
//!
//! Opens outbound TCP streams through SOCKS4/4a, SOCKS5 or HTTP CONNECT
//! proxies so that the result behaves like a direct connection to the
//! destination.
//!
//! ```no_run
//! use socktunnel::{ProxyConfig, ProxyConnector};
//!
//! # async fn run() -> socktunnel::Result<()> {
//! let connector = ProxyConnector::new(ProxyConfig::socks5("127.0.0.1", Some(9050)));
//! let stream = connector.connect("example.com", 80).await?;
//! println!("{:?}", stream.negotiation());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connector;
pub mod error;
pub mod protocol;

pub use config::{Config, ProxyConfig, ProxyKind};
pub use connector::{Dialer, ProxiedStream, ProxyConnector, TcpDialer};
pub use error::{GeneralKind, ProxyError};
pub use protocol::{Destination, NegotiationResult};

/// Result type for tunnel operations
pub type Result<T> = std::result::Result<T, ProxyError>;
