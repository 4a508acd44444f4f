//! Exact-length framing for handshake streams
//!
//! Every negotiator talks to its proxy through an [`ExactReader`], which never
//! returns short reads and applies one deadline to the whole handshake.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::{GeneralKind, ProxyError};
use crate::Result;

/// Handshake stream wrapper with exact reads and an optional deadline
#[derive(Debug)]
pub struct ExactReader<S> {
    stream: S,
    deadline: Option<Instant>,
}

impl<S> ExactReader<S> {
    /// Wrap a stream with no deadline
    pub fn new(stream: S) -> Self {
        Self { stream, deadline: None }
    }

    /// Wrap a stream; the deadline starts counting now
    pub fn with_timeout(stream: S, timeout: Option<Duration>) -> Self {
        Self {
            stream,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Get the underlying stream once the handshake is over
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: AsyncRead + Unpin> ExactReader<S> {
    /// Read exactly `n` bytes, looping over partial reads.
    ///
    /// End of stream before `n` bytes fails with "not connected".
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf).await?;
        Ok(buf)
    }

    pub async fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        self.fill(&mut out).await?;
        Ok(out)
    }

    pub async fn read_u8(&mut self) -> Result<u8> {
        let [byte] = self.read_array::<1>().await?;
        Ok(byte)
    }

    /// Read a big-endian u16
    pub async fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array::<2>().await?))
    }

    /// Read one byte at a time until `terminator` ends the accumulated data.
    ///
    /// Nothing past the terminator is consumed. Fails with "invalid data" once
    /// `limit` bytes have been read without seeing it.
    pub async fn read_until(&mut self, terminator: &[u8], limit: usize) -> Result<Vec<u8>> {
        let mut data = Vec::new();

        while !data.ends_with(terminator) {
            if data.len() >= limit {
                debug!("No terminator within {} bytes", limit);
                return Err(ProxyError::invalid_data());
            }
            data.push(self.read_u8().await?);
        }

        Ok(data)
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;

        while filled < buf.len() {
            let read = within(self.deadline, self.stream.read(&mut buf[filled..])).await?;
            if read == 0 {
                debug!("Stream closed after {} of {} bytes", filled, buf.len());
                return Err(ProxyError::not_connected());
            }
            filled += read;
        }

        Ok(())
    }
}

impl<S: AsyncWrite + Unpin> ExactReader<S> {
    /// Write the whole buffer and flush it
    pub async fn send(&mut self, buf: &[u8]) -> Result<()> {
        within(self.deadline, self.stream.write_all(buf)).await?;
        within(self.deadline, self.stream.flush()).await
    }

    /// Best-effort shutdown of the write half before the stream is dropped
    pub async fn close(&mut self) {
        if let Err(e) = within(self.deadline, self.stream.shutdown()).await {
            debug!("Shutdown after failed handshake: {}", e);
        }
    }
}

async fn within<F, T>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    let result = match deadline {
        Some(deadline) => match timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => return Err(ProxyError::General(GeneralKind::TimedOut)),
        },
        None => fut.await,
    };

    result.map_err(|e| {
        debug!("Handshake I/O error: {}", e);
        match e.kind() {
            io::ErrorKind::TimedOut => ProxyError::General(GeneralKind::TimedOut),
            _ => ProxyError::not_connected(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_exact_byte_at_a_time() {
        let mut builder = Builder::new();
        for byte in b"socks" {
            builder.read(&[*byte]);
        }
        let mut reader = ExactReader::new(builder.build());

        let data = reader.read_exact(5).await.unwrap();
        assert_eq!(data, b"socks");
    }

    #[tokio::test]
    async fn test_read_array_spans_partial_reads() {
        let mock = Builder::new().read(&[0x05]).read(&[0x00, 0x00]).read(&[0x01]).build();
        let mut reader = ExactReader::new(mock);

        assert_eq!(reader.read_array::<4>().await.unwrap(), [0x05, 0x00, 0x00, 0x01]);
        assert_eq!(reader.read_u8().await, Err(ProxyError::not_connected()));
    }

    #[tokio::test]
    async fn test_read_exact_zero_returns_immediately() {
        let mut reader = ExactReader::new(Builder::new().build());
        assert!(reader.read_exact(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_exact_short_stream_is_not_connected() {
        let mock = Builder::new().read(&[0x05]).build();
        let mut reader = ExactReader::new(mock);

        let err = reader.read_exact(2).await.unwrap_err();
        assert_eq!(err, ProxyError::not_connected());
    }

    #[tokio::test]
    async fn test_read_u16_is_big_endian() {
        let mock = Builder::new().read(&[0x00]).read(&[0x50]).build();
        let mut reader = ExactReader::new(mock);
        assert_eq!(reader.read_u16().await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_read_until_stops_at_terminator() {
        let (mut proxy, client) = tokio::io::duplex(64);
        proxy.write_all(b"HTTP/1.1 200 OK\r\n\r\ntunnel").await.unwrap();

        let mut reader = ExactReader::new(client);
        let header = reader.read_until(b"\r\n\r\n", 1024).await.unwrap();
        assert_eq!(header, b"HTTP/1.1 200 OK\r\n\r\n");

        // Tunneled bytes stay in the stream
        assert_eq!(reader.read_exact(6).await.unwrap(), b"tunnel");
    }

    #[tokio::test]
    async fn test_read_until_respects_limit() {
        let (mut proxy, client) = tokio::io::duplex(64);
        proxy.write_all(b"HTTP/1.1 200").await.unwrap();
        let mut reader = ExactReader::new(client);

        let err = reader.read_until(b"\r\n\r\n", 4).await.unwrap_err();
        assert_eq!(err, ProxyError::invalid_data());
    }

    #[tokio::test]
    async fn test_deadline_expires_as_timeout() {
        let (_proxy, client) = tokio::io::duplex(64);
        let mut reader = ExactReader::with_timeout(client, Some(Duration::from_millis(50)));

        let err = reader.read_exact(2).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_peer_close_is_not_connected() {
        let (proxy, client) = tokio::io::duplex(64);
        drop(proxy);
        let mut reader = ExactReader::with_timeout(client, Some(Duration::from_secs(5)));

        let err = reader.read_exact(1).await.unwrap_err();
        assert_eq!(err, ProxyError::not_connected());
    }
}
