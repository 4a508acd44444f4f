//! Proxy Connector
//!
//! Opens the raw stream (to the proxy, or straight to the destination when no
//! proxy is configured) and hands it to the negotiator for the proxy kind.

use std::io;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dialer::{Dialer, TcpDialer};
use super::stream::ProxiedStream;
use crate::config::{self, ProxyConfig, ProxyKind};
use crate::error::{GeneralKind, ProxyError};
use crate::protocol::{
    Destination, ExactReader, HttpConnectNegotiator, Socks4Negotiator, Socks5Negotiator,
};
use crate::Result;

/// Opens transparent streams to destinations, optionally through a proxy.
///
/// The connector owns its copy of the [`ProxyConfig`], taken when it is built.
#[derive(Debug, Clone)]
pub struct ProxyConnector<D = TcpDialer> {
    config: ProxyConfig,
    handshake_timeout: Option<Duration>,
    dialer: D,
}

impl ProxyConnector<TcpDialer> {
    /// Connector with a plain TCP dialer and no timeouts
    pub fn new(config: ProxyConfig) -> Self {
        Self::with_dialer(config, TcpDialer::default())
    }

    /// Connector using a snapshot of the process-wide default proxy
    pub fn from_default() -> Self {
        Self::new(config::default_proxy())
    }
}

impl<D: Dialer> ProxyConnector<D> {
    pub fn with_dialer(config: ProxyConfig, dialer: D) -> Self {
        Self {
            config,
            handshake_timeout: None,
            dialer,
        }
    }

    /// Bound the whole proxy handshake, including local name resolution
    pub fn with_handshake_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Open a stream to `host:port`
    #[instrument(
        skip(self),
        fields(attempt = %Uuid::new_v4(), kind = %self.config.kind)
    )]
    pub async fn connect(&self, host: &str, port: u16) -> Result<ProxiedStream<D::Stream>> {
        let destination = Destination::new(host, port)?;
        self.connect_to(destination).await
    }

    /// Open a stream to an already validated destination
    pub async fn connect_to(&self, destination: Destination) -> Result<ProxiedStream<D::Stream>> {
        let config = &self.config;

        let (address, port) = match (config.kind, config.effective_port()) {
            (ProxyKind::None, _) => {
                let stream = self.dial(&destination.host, destination.port).await?;
                info!("Connected directly to {}", destination);
                return Ok(ProxiedStream::direct(stream, destination));
            }
            (_, Some(port)) if !config.address.is_empty() => (config.address.as_str(), port),
            _ => {
                warn!("Proxy type {} configured without an address", config.kind);
                return Err(ProxyError::bad_input());
            }
        };

        let stream = self.dial(address, port).await?;
        debug!("Connected to {} proxy at {}:{}", config.kind, address, port);

        let io = ExactReader::with_timeout(stream, self.handshake_timeout);
        let (stream, negotiation) = match config.kind {
            ProxyKind::Socks5 => Socks5Negotiator::new(io, config).negotiate(&destination).await?,
            ProxyKind::Socks4 => Socks4Negotiator::new(io, config).negotiate(&destination).await?,
            ProxyKind::Http => {
                HttpConnectNegotiator::new(io, config)
                    .negotiate(&destination)
                    .await?
            }
            ProxyKind::None => return Err(ProxyError::General(GeneralKind::BadProxyType)),
        };

        info!(
            "Tunnel to {} established via {} proxy {}:{}",
            destination, config.kind, address, port
        );
        Ok(ProxiedStream::tunneled(stream, destination, negotiation))
    }

    async fn dial(&self, host: &str, port: u16) -> Result<D::Stream> {
        self.dialer.dial(host, port).await.map_err(|e| {
            warn!("Failed to connect to {}:{}: {}", host, port, e);
            match e.kind() {
                io::ErrorKind::TimedOut => ProxyError::General(GeneralKind::TimedOut),
                _ => ProxyError::not_connected(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    /// Dialer that hands out one end of an in-memory pipe and records targets
    #[derive(Clone, Default)]
    struct PipeDialer {
        dialed: Arc<Mutex<Vec<(String, u16)>>>,
        proxy_side: Arc<Mutex<Option<DuplexStream>>>,
    }

    impl Dialer for PipeDialer {
        type Stream = DuplexStream;

        async fn dial(&self, host: &str, port: u16) -> io::Result<DuplexStream> {
            self.dialed.lock().unwrap().push((host.to_string(), port));
            let (client, proxy) = tokio::io::duplex(1024);
            *self.proxy_side.lock().unwrap() = Some(proxy);
            Ok(client)
        }
    }

    struct RefusingDialer;

    impl Dialer for RefusingDialer {
        type Stream = DuplexStream;

        async fn dial(&self, _host: &str, _port: u16) -> io::Result<DuplexStream> {
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    #[tokio::test]
    async fn test_direct_connection_bypasses_negotiators() {
        let dialer = PipeDialer::default();
        let connector = ProxyConnector::with_dialer(ProxyConfig::direct(), dialer.clone());

        let stream = connector.connect("example.com", 80).await.unwrap();
        assert!(!stream.is_proxied());
        assert_eq!(stream.peer(), ("example.com", 80));
        assert_eq!(
            dialer.dialed.lock().unwrap().as_slice(),
            &[("example.com".to_string(), 80)]
        );
    }

    #[tokio::test]
    async fn test_default_ports_per_kind() {
        for (config, expected) in [
            (ProxyConfig::socks5("proxy.local", None), 1080),
            (ProxyConfig::socks4("proxy.local", None), 1080),
            (ProxyConfig::http("proxy.local", None), 8080),
            (ProxyConfig::http("proxy.local", Some(3128)), 3128),
        ] {
            let dialer = PipeDialer::default();
            let connector = ProxyConnector::with_dialer(config, dialer.clone())
                .with_handshake_timeout(Some(Duration::from_millis(50)));

            // Nobody answers on the proxy side, so the handshake times out
            let err = connector.connect("10.0.0.1", 80).await.unwrap_err();
            assert!(err.is_timeout());
            assert_eq!(
                dialer.dialed.lock().unwrap().as_slice(),
                &[("proxy.local".to_string(), expected)]
            );
        }
    }

    #[tokio::test]
    async fn test_socks4_end_to_end_over_pipe() {
        let dialer = PipeDialer::default();
        let connector =
            ProxyConnector::with_dialer(ProxyConfig::socks4("10.0.0.1", Some(1080)), dialer.clone());

        let proxy_side = dialer.proxy_side.clone();
        let proxy = tokio::spawn(async move {
            // Wait for the connector to dial
            let mut proxy = loop {
                let dialed = proxy_side.lock().unwrap().take();
                if let Some(stream) = dialed {
                    break stream;
                }
                tokio::task::yield_now().await;
            };
            let mut request = [0u8; 9];
            proxy.read_exact(&mut request).await.unwrap();
            proxy
                .write_all(&[0x00, 0x5A, 0x00, 0x50, 0x5D, 0xB8, 0xD8, 0x22])
                .await
                .unwrap();
            proxy.write_all(b"hello").await.unwrap();
            request
        });

        let mut stream = connector.connect("93.184.216.34", 80).await.unwrap();
        let request = proxy.await.unwrap();
        assert_eq!(request, [0x04, 0x01, 0x00, 0x50, 0x5D, 0xB8, 0xD8, 0x22, 0x00]);
        assert_eq!(stream.proxy_bound_addr(), Some(("93.184.216.34", 80)));

        let mut data = [0u8; 5];
        stream.read_exact(&mut data).await.unwrap();
        assert_eq!(&data, b"hello");
    }

    #[tokio::test]
    async fn test_refused_connection_is_not_connected() {
        let connector = ProxyConnector::with_dialer(ProxyConfig::socks5("10.0.0.1", None), RefusingDialer);
        let err = connector.connect("example.com", 80).await.unwrap_err();
        assert_eq!(err, ProxyError::not_connected());
    }

    #[tokio::test]
    async fn test_invalid_destination_is_bad_input() {
        let connector = ProxyConnector::with_dialer(ProxyConfig::direct(), PipeDialer::default());
        assert_eq!(connector.connect("", 80).await.unwrap_err(), ProxyError::bad_input());
        assert_eq!(
            connector.connect("example.com", 0).await.unwrap_err(),
            ProxyError::bad_input()
        );
    }

    #[tokio::test]
    async fn test_proxy_without_address_is_bad_input() {
        let connector =
            ProxyConnector::with_dialer(ProxyConfig::socks5("", None), PipeDialer::default());
        assert_eq!(
            connector.connect("example.com", 80).await.unwrap_err(),
            ProxyError::bad_input()
        );
    }

    #[tokio::test]
    async fn test_from_default_snapshots_config() {
        assert!(config::set_default_proxy(ProxyConfig::socks5("127.0.0.1", Some(9050))).is_ok());
        let connector = ProxyConnector::from_default();
        assert_eq!(connector.config().kind, ProxyKind::Socks5);

        // The default is set once
        assert!(config::set_default_proxy(ProxyConfig::direct()).is_err());
        assert_eq!(config::default_proxy().effective_port(), Some(9050));
    }
}
