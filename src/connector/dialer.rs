//! Raw stream dialing

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Something that can open a plain byte stream to `host:port`.
///
/// The connector wraps one of these instead of extending a socket type.
pub trait Dialer: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    fn dial(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Opens TCP connections, optionally bounded by a connect timeout
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        let connect = TcpStream::connect((host, port));

        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connecting to {}:{} timed out", host, port),
                )
            })??,
            None => connect.await?,
        };

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
