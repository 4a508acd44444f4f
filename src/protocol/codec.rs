//! Wire encoding helpers shared by the negotiators

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::{GeneralKind, ProxyError};
use crate::Result;

/// Append a one-byte length followed by `bytes` (SOCKS5 names, RFC 1929 fields)
pub fn put_len_prefixed(buf: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    let len = u8::try_from(bytes.len()).map_err(|_| {
        debug!("Field of {} bytes does not fit a length byte", bytes.len());
        ProxyError::bad_input()
    })?;
    buf.put_u8(len);
    buf.put_slice(bytes);
    Ok(())
}

/// Append `bytes` followed by a NUL terminator (SOCKS4 user-id and host)
pub fn put_nul_terminated(buf: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    if bytes.contains(&0) {
        return Err(ProxyError::bad_input());
    }
    buf.put_slice(bytes);
    buf.put_u8(0x00);
    Ok(())
}

/// Resolve `host` locally to its first IPv4 address
pub async fn resolve_ipv4(host: &str, deadline: Option<Instant>) -> Result<Ipv4Addr> {
    let lookup = tokio::net::lookup_host((host, 0));
    let addrs = match deadline {
        Some(deadline) => timeout_at(deadline, lookup)
            .await
            .map_err(|_| ProxyError::General(GeneralKind::TimedOut))?,
        None => lookup.await,
    };

    let mut addrs = addrs.map_err(|e| {
        debug!("Failed to resolve {}: {}", host, e);
        ProxyError::General(GeneralKind::NotAvailable)
    })?;

    addrs
        .find_map(|addr| match addr.ip() {
            std::net::IpAddr::V4(ip) => Some(ip),
            std::net::IpAddr::V6(_) => None,
        })
        .ok_or_else(|| {
            debug!("No IPv4 address for {}", host);
            ProxyError::General(GeneralKind::NotAvailable)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_prefixed() {
        let mut buf = BytesMut::new();
        put_len_prefixed(&mut buf, b"example.com").unwrap();
        assert_eq!(buf[0], 11);
        assert_eq!(&buf[1..], b"example.com");
    }

    #[test]
    fn test_len_prefixed_rejects_long_fields() {
        let mut buf = BytesMut::new();
        let long = vec![b'a'; 256];
        assert_eq!(put_len_prefixed(&mut buf, &long), Err(ProxyError::bad_input()));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_nul_terminated() {
        let mut buf = BytesMut::new();
        put_nul_terminated(&mut buf, b"").unwrap();
        put_nul_terminated(&mut buf, b"user").unwrap();
        assert_eq!(&buf[..], b"\0user\0");
        assert!(put_nul_terminated(&mut buf, b"us\0er").is_err());
    }

    #[tokio::test]
    async fn test_resolve_literal() {
        let ip = resolve_ipv4("127.0.0.1", None).await.unwrap();
        assert_eq!(ip, Ipv4Addr::LOCALHOST);
    }
}
