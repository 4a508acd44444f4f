//! HTTP CONNECT Client Handshake

use base64::Engine;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use super::codec::resolve_ipv4;
use super::io::ExactReader;
use super::types::has_line_break;
use super::{Destination, NegotiationResult};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::protocol::constants::{HTTP_HEADER_TERMINATOR, HTTP_MAX_HEADER_SIZE};
use crate::Result;

/// Negotiates a tunnel through an HTTP proxy with CONNECT
pub struct HttpConnectNegotiator<'a, S> {
    io: ExactReader<S>,
    config: &'a ProxyConfig,
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> HttpConnectNegotiator<'a, S> {
    pub fn new(io: ExactReader<S>, config: &'a ProxyConfig) -> Self {
        Self { io, config }
    }

    /// Run the handshake, shutting the stream down on failure
    pub async fn negotiate(mut self, destination: &Destination) -> Result<(S, NegotiationResult)> {
        match self.handshake(destination).await {
            Ok(result) => Ok((self.io.into_inner(), result)),
            Err(e) => {
                warn!("HTTP CONNECT to {} failed: {}", destination, e);
                self.io.close().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self, destination: &Destination) -> Result<NegotiationResult> {
        if has_line_break(&destination.host) {
            return Err(ProxyError::bad_input());
        }

        let addr = if self.config.resolve_remotely {
            destination.host.clone()
        } else {
            let ip = resolve_ipv4(&destination.host, self.io.deadline()).await?;
            debug!("Resolved {} locally to {}", destination.host, ip);
            ip.to_string()
        };

        let request = self.build_request(&addr, destination);
        self.io.send(request.as_bytes()).await?;

        let header = self
            .io
            .read_until(HTTP_HEADER_TERMINATOR, HTTP_MAX_HEADER_SIZE)
            .await?;
        parse_status(&header)?;

        debug!("HTTP CONNECT tunnel to {} established", destination);

        // CONNECT does not report a bind address
        Ok(NegotiationResult {
            bound_address: "0.0.0.0".to_string(),
            bound_port: 0,
            peer_address: addr,
            peer_port: destination.port,
        })
    }

    fn build_request(&self, addr: &str, destination: &Destination) -> String {
        let mut request = format!(
            "CONNECT {}:{} HTTP/1.1\r\nHost: {}\r\n",
            addr, destination.port, destination.host
        );

        if let Some((username, password)) = self.config.credentials() {
            let credentials = base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", username, password));
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", credentials));
        }

        request.push_str("\r\n");
        request
    }
}

/// Check the status line of a CONNECT response header
fn parse_status(header: &[u8]) -> Result<()> {
    let header = String::from_utf8_lossy(header);
    let status_line = header.split("\r\n").next().unwrap_or_default();

    // <version> <status> <reason...>
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if version != "HTTP/1.0" && version != "HTTP/1.1" {
        debug!("Unexpected HTTP version in status line: {:?}", status_line);
        return Err(ProxyError::invalid_data());
    }

    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            debug!("Unparseable status code in status line: {:?}", status_line);
            ProxyError::invalid_data()
        })?;

    if status != 200 {
        return Err(ProxyError::Http {
            status,
            reason: parts.next().unwrap_or_default().to_string(),
        });
    }

    Ok(())
}
