//! SOCKS5 Client Handshake (RFC 1928, RFC 1929)

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::codec::{put_len_prefixed, resolve_ipv4};
use super::io::ExactReader;
use super::{AuthMethod, Destination, NegotiationResult, Socks5Reply, TargetAddr};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Socks5AuthFailure};
use crate::protocol::constants::*;
use crate::Result;

/// Negotiates a CONNECT through a SOCKS5 server
pub struct Socks5Negotiator<'a, S> {
    io: ExactReader<S>,
    config: &'a ProxyConfig,
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> Socks5Negotiator<'a, S> {
    pub fn new(io: ExactReader<S>, config: &'a ProxyConfig) -> Self {
        Self { io, config }
    }

    /// Run the handshake.
    ///
    /// On success the stream is handed back ready for application data; on
    /// failure it is shut down before the error is returned.
    pub async fn negotiate(mut self, destination: &Destination) -> Result<(S, NegotiationResult)> {
        match self.handshake(destination).await {
            Ok(result) => Ok((self.io.into_inner(), result)),
            Err(e) => {
                warn!("SOCKS5 negotiation for {} failed: {}", destination, e);
                self.io.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, destination: &Destination) -> Result<NegotiationResult> {
        let config = self.config;
        let credentials = config.credentials();
        if let Some((username, password)) = credentials {
            if username.len() > 255 || password.len() > 255 {
                return Err(ProxyError::bad_input());
            }
        }

        let target = destination.target();
        if let TargetAddr::Domain(name) = &target {
            if config.resolve_remotely && name.len() > 255 {
                return Err(ProxyError::bad_input());
            }
        }

        let methods: &[u8] = if credentials.is_some() {
            &[SOCKS5_AUTH_NONE, SOCKS5_AUTH_USERPASS]
        } else {
            &[SOCKS5_AUTH_NONE]
        };
        self.send_greeting(methods).await?;

        match self.receive_auth_method().await? {
            AuthMethod::NoAuth => debug!("SOCKS5 server requires no authentication"),
            AuthMethod::UserPass => match credentials {
                Some((username, password)) => {
                    self.authenticate_username_password(username, password).await?
                }
                // Selected a method we never offered
                None => return Err(ProxyError::Socks5Auth(Socks5AuthFailure::AuthRequired)),
            },
            AuthMethod::NoAcceptable => {
                return Err(ProxyError::Socks5Auth(Socks5AuthFailure::MethodsRejected))
            }
            AuthMethod::Other(code) => {
                debug!("SOCKS5 server selected unsupported method 0x{:02X}", code);
                return Err(ProxyError::invalid_data());
            }
        }

        // Names are resolved here unless the proxy should do it
        let (request_addr, peer_address) = match target {
            TargetAddr::Ipv4(ip) => (TargetAddr::Ipv4(ip), ip.to_string()),
            TargetAddr::Domain(name) if config.resolve_remotely => {
                (TargetAddr::Domain(name.clone()), name)
            }
            TargetAddr::Domain(name) => {
                let ip = resolve_ipv4(&name, self.io.deadline()).await?;
                debug!("Resolved {} locally to {}", name, ip);
                (TargetAddr::Ipv4(ip), ip.to_string())
            }
        };

        self.send_connect_request(&request_addr, destination.port).await?;
        let (bound_address, bound_port) = self.receive_connect_response().await?;

        debug!(
            "SOCKS5 tunnel to {} established, proxy bound {}:{}",
            destination, bound_address, bound_port
        );

        Ok(NegotiationResult {
            bound_address,
            bound_port,
            peer_address,
            peer_port: destination.port,
        })
    }

    /// Send SOCKS5 greeting
    async fn send_greeting(&mut self, methods: &[u8]) -> Result<()> {
        let mut greeting = BytesMut::with_capacity(2 + methods.len());
        greeting.put_u8(SOCKS5_VERSION);
        greeting.put_u8(methods.len() as u8);
        greeting.put_slice(methods);

        self.io.send(&greeting).await
    }

    /// Receive authentication method selection
    async fn receive_auth_method(&mut self) -> Result<AuthMethod> {
        let [version, method] = self.io.read_array::<2>().await?;

        if version != SOCKS5_VERSION {
            debug!("Invalid SOCKS version in auth response: {}", version);
            return Err(ProxyError::invalid_data());
        }

        Ok(AuthMethod::from_code(method))
    }

    /// Authenticate with username/password
    async fn authenticate_username_password(&mut self, username: &str, password: &str) -> Result<()> {
        // +----+------+----------+------+----------+
        // |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
        // +----+------+----------+------+----------+
        let mut auth_request = BytesMut::with_capacity(3 + username.len() + password.len());
        auth_request.put_u8(SOCKS5_USERPASS_VERSION);
        put_len_prefixed(&mut auth_request, username.as_bytes())?;
        put_len_prefixed(&mut auth_request, password.as_bytes())?;

        self.io.send(&auth_request).await?;

        let [version, status] = self.io.read_array::<2>().await?;

        if version != SOCKS5_USERPASS_VERSION {
            debug!("Invalid auth response version: {}", version);
            return Err(ProxyError::invalid_data());
        }

        if status != SOCKS5_USERPASS_SUCCESS {
            return Err(ProxyError::Socks5Auth(Socks5AuthFailure::BadCredentials));
        }

        debug!("SOCKS5 username/password accepted");
        Ok(())
    }

    /// Send CONNECT request
    async fn send_connect_request(&mut self, target: &TargetAddr, port: u16) -> Result<()> {
        let mut request = BytesMut::with_capacity(262);

        // VER CMD RSV ATYP
        request.put_u8(SOCKS5_VERSION);
        request.put_u8(SOCKS5_CMD_CONNECT);
        request.put_u8(SOCKS5_RESERVED);
        request.put_u8(target.address_type());

        match target {
            TargetAddr::Ipv4(ip) => request.put_slice(&ip.octets()),
            TargetAddr::Domain(domain) => put_len_prefixed(&mut request, domain.as_bytes())?,
        }

        request.put_u16(port);

        self.io.send(&request).await
    }

    /// Receive CONNECT response, returning the bound address and port
    async fn receive_connect_response(&mut self) -> Result<(String, u16)> {
        // VER REP RSV ATYP
        let [version, reply, _reserved, address_type] = self.io.read_array::<4>().await?;

        if version != SOCKS5_VERSION {
            debug!("Invalid SOCKS version in response: {}", version);
            return Err(ProxyError::invalid_data());
        }

        if reply != SOCKS5_REPLY_SUCCESS {
            debug!("SOCKS5 server replied with code {}", reply);
            return Err(ProxyError::Socks5(Socks5Reply::from_code(reply)));
        }

        let bound_address = match address_type {
            SOCKS5_ADDR_IPV4 => {
                let octets = self.io.read_array::<4>().await?;
                std::net::Ipv4Addr::from(octets).to_string()
            }
            SOCKS5_ADDR_DOMAIN => {
                let len = self.io.read_u8().await?;
                let name = self.io.read_exact(len as usize).await?;
                String::from_utf8_lossy(&name).into_owned()
            }
            _ => {
                debug!("Unsupported bind address type: {}", address_type);
                return Err(ProxyError::invalid_data());
            }
        };

        let bound_port = self.io.read_u16().await?;

        Ok((bound_address, bound_port))
    }
}
