//! Tunneled stream returned by the connector

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

use crate::protocol::{Destination, NegotiationResult};

/// A stream that behaves like a direct connection to the destination.
///
/// Reads and writes go straight to the inner stream; the handshake is over by
/// the time one of these exists.
#[derive(Debug)]
pub struct ProxiedStream<S> {
    inner: S,
    destination: Destination,
    negotiation: Option<NegotiationResult>,
}

impl<S> ProxiedStream<S> {
    pub(crate) fn direct(inner: S, destination: Destination) -> Self {
        Self {
            inner,
            destination,
            negotiation: None,
        }
    }

    pub(crate) fn tunneled(inner: S, destination: Destination, negotiation: NegotiationResult) -> Self {
        Self {
            inner,
            destination,
            negotiation: Some(negotiation),
        }
    }

    /// Handshake outcome; `None` for direct connections
    pub fn negotiation(&self) -> Option<&NegotiationResult> {
        self.negotiation.as_ref()
    }

    pub fn is_proxied(&self) -> bool {
        self.negotiation.is_some()
    }

    /// Address and port the proxy reported binding
    pub fn proxy_bound_addr(&self) -> Option<(&str, u16)> {
        self.negotiation
            .as_ref()
            .map(|n| (n.bound_address.as_str(), n.bound_port))
    }

    /// The destination as the proxy was asked for it, or as dialed directly
    pub fn peer(&self) -> (&str, u16) {
        match &self.negotiation {
            Some(n) => (n.peer_address.as_str(), n.peer_port),
            None => (self.destination.host.as_str(), self.destination.port),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl ProxiedStream<TcpStream> {
    /// Address of the socket we are connected to: the proxy, or the
    /// destination itself for direct connections
    pub fn proxy_peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ProxiedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ProxiedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
