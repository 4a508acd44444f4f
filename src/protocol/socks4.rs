//! SOCKS4 / SOCKS4a Client Handshake
//!
//! SOCKS4 only carries IPv4 destinations. When the destination is a name and
//! the proxy should resolve it, the SOCKS4a extension is used instead: the IP
//! field holds `0.0.0.1` and the name follows the user-id.

use bytes::{BufMut, BytesMut};
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::codec::{put_nul_terminated, resolve_ipv4};
use super::io::ExactReader;
use super::{Destination, NegotiationResult, Socks4Reply, TargetAddr};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::protocol::constants::*;
use crate::Result;

/// Negotiates a CONNECT through a SOCKS4 or SOCKS4a server
pub struct Socks4Negotiator<'a, S> {
    io: ExactReader<S>,
    config: &'a ProxyConfig,
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> Socks4Negotiator<'a, S> {
    pub fn new(io: ExactReader<S>, config: &'a ProxyConfig) -> Self {
        Self { io, config }
    }

    /// Run the handshake, shutting the stream down on failure
    pub async fn negotiate(mut self, destination: &Destination) -> Result<(S, NegotiationResult)> {
        match self.handshake(destination).await {
            Ok(result) => Ok((self.io.into_inner(), result)),
            Err(e) => {
                warn!("SOCKS4 negotiation for {} failed: {}", destination, e);
                self.io.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, destination: &Destination) -> Result<NegotiationResult> {
        // (address in the IP field, name for the 4a extension)
        let (ip, remote_name) = match destination.target() {
            TargetAddr::Ipv4(ip) => (ip, None),
            TargetAddr::Domain(name) if self.config.resolve_remotely => {
                (Ipv4Addr::from(SOCKS4A_SENTINEL), Some(name))
            }
            TargetAddr::Domain(name) => {
                let ip = resolve_ipv4(&name, self.io.deadline()).await?;
                debug!("Resolved {} locally to {}", name, ip);
                (ip, None)
            }
        };

        let request = self.build_request(ip, remote_name.as_deref(), destination.port)?;
        self.io.send(&request).await?;

        let (bound_address, bound_port) = self.receive_reply().await?;

        let peer_address = match remote_name {
            Some(name) => name,
            None => ip.to_string(),
        };

        debug!(
            "SOCKS4 tunnel to {} established, proxy bound {}:{}",
            destination, bound_address, bound_port
        );

        Ok(NegotiationResult {
            bound_address,
            bound_port,
            peer_address,
            peer_port: destination.port,
        })
    }

    /// VN CD DSTPORT DSTIP USERID NUL [HOST NUL]
    fn build_request(&self, ip: Ipv4Addr, remote_name: Option<&str>, port: u16) -> Result<BytesMut> {
        let user_id = self.config.username.as_deref().unwrap_or("");

        let mut request = BytesMut::with_capacity(
            10 + user_id.len() + remote_name.map_or(0, |name| name.len() + 1),
        );
        request.put_u8(SOCKS4_VERSION);
        request.put_u8(SOCKS4_CMD_CONNECT);
        request.put_u16(port);
        request.put_slice(&ip.octets());
        put_nul_terminated(&mut request, user_id.as_bytes())?;

        if let Some(name) = remote_name {
            put_nul_terminated(&mut request, name.as_bytes())?;
        }

        Ok(request)
    }

    /// Read the 8-byte reply: VN CD DSTPORT DSTIP
    async fn receive_reply(&mut self) -> Result<(String, u16)> {
        let reply = self.io.read_array::<8>().await?;

        if reply[0] != SOCKS4_REPLY_VERSION {
            debug!("Invalid SOCKS4 reply version: {}", reply[0]);
            return Err(ProxyError::invalid_data());
        }

        if reply[1] != SOCKS4_REPLY_GRANTED {
            debug!("SOCKS4 server replied with code {}", reply[1]);
            return Err(ProxyError::Socks4(Socks4Reply::from_code(reply[1])));
        }

        let bound_port = u16::from_be_bytes([reply[2], reply[3]]);
        let bound_address = Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]).to_string();

        Ok((bound_address, bound_port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    async fn run(
        mock: tokio_test::io::Mock,
        config: &ProxyConfig,
        host: &str,
        port: u16,
    ) -> Result<NegotiationResult> {
        let dest = Destination::new(host, port).unwrap();
        Socks4Negotiator::new(ExactReader::new(mock), config)
            .negotiate(&dest)
            .await
            .map(|(_, result)| result)
    }

    #[tokio::test]
    async fn test_ipv4_request_and_granted_reply() {
        let config = ProxyConfig::socks4("10.0.0.1", Some(1080));
        let mock = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 0x5D, 0xB8, 0xD8, 0x22, 0x00])
            .read(&[0x00, 0x5A, 0x00, 0x50, 0x5D, 0xB8, 0xD8, 0x22])
            .build();

        let result = run(mock, &config, "93.184.216.34", 80).await.unwrap();
        assert_eq!(result.bound_address, "93.184.216.34");
        assert_eq!(result.bound_port, 80);
        assert_eq!(result.peer_address, "93.184.216.34");
        assert_eq!(result.peer_port, 80);
    }

    #[tokio::test]
    async fn test_socks4a_for_remote_names() {
        let config = ProxyConfig::socks4("10.0.0.1", None);

        let mut request = vec![0x04, 0x01, 0x01, 0xBB, 0x00, 0x00, 0x00, 0x01, 0x00];
        request.extend_from_slice(b"example.com");
        request.push(0x00);

        let mock = Builder::new()
            .write(&request)
            .read(&[0x00, 0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .build();

        let result = run(mock, &config, "example.com", 443).await.unwrap();
        assert_eq!(result.peer_address, "example.com");
        assert_eq!(result.bound_address, "0.0.0.0");
    }

    #[tokio::test]
    async fn test_user_id_is_sent() {
        let config = ProxyConfig::socks4("10.0.0.1", None).with_user_id("bob");

        let mock = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x15, 10, 0, 0, 9, b'b', b'o', b'b', 0x00])
            .read(&[0x00, 0x5A, 0x00, 0x15, 10, 0, 0, 9])
            .build();

        assert!(run(mock, &config, "10.0.0.9", 21).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_resolution_skips_socks4a() {
        let config = ProxyConfig::socks4("10.0.0.1", None).resolve_locally();

        let mock = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 127, 0, 0, 1, 0x00])
            .read(&[0x00, 0x5A, 0x00, 0x50, 127, 0, 0, 1])
            .build();

        let result = run(mock, &config, "localhost", 80).await.unwrap();
        assert_eq!(result.peer_address, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_rejection_codes() {
        for (code, expected) in [
            (0x5B, Socks4Reply::Rejected),
            (0x5C, Socks4Reply::IdentdUnreachable),
            (0x5D, Socks4Reply::IdentdMismatch),
            (0x10, Socks4Reply::Unknown),
        ] {
            let config = ProxyConfig::socks4("10.0.0.1", None);
            let mock = Builder::new()
                .write(&[0x04, 0x01, 0x00, 0x50, 1, 2, 3, 4, 0x00])
                .read(&[0x00, code, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
                .build();

            let err = run(mock, &config, "1.2.3.4", 80).await.unwrap_err();
            assert_eq!(err, ProxyError::Socks4(expected));
        }
    }

    #[tokio::test]
    async fn test_bad_reply_version() {
        let config = ProxyConfig::socks4("10.0.0.1", None);
        let mock = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 1, 2, 3, 4, 0x00])
            .read(&[0x04, 0x5A, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
            .build();

        let err = run(mock, &config, "1.2.3.4", 80).await.unwrap_err();
        assert_eq!(err, ProxyError::invalid_data());
    }

    #[tokio::test]
    async fn test_short_reply() {
        let config = ProxyConfig::socks4("10.0.0.1", None);
        let mock = Builder::new()
            .write(&[0x04, 0x01, 0x00, 0x50, 1, 2, 3, 4, 0x00])
            .read(&[0x00, 0x5A, 0x00])
            .build();

        let err = run(mock, &config, "1.2.3.4", 80).await.unwrap_err();
        assert_eq!(err, ProxyError::not_connected());
    }
}
