//! Proxy Negotiation Errors

use thiserror::Error;

use crate::protocol::{Socks4Reply, Socks5Reply};

/// Failures that are not a status reported by the proxy itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralKind {
    /// Malformed reply, wrong version byte or unexpected method
    InvalidData,
    /// The stream ended or could not be opened
    NotConnected,
    /// Local name resolution produced no IPv4 address
    NotAvailable,
    BadProxyType,
    BadInput,
    /// The handshake deadline passed
    TimedOut,
}

impl GeneralKind {
    pub fn code(self) -> u8 {
        match self {
            GeneralKind::InvalidData => 1,
            GeneralKind::NotConnected => 2,
            GeneralKind::NotAvailable => 3,
            GeneralKind::BadProxyType => 4,
            GeneralKind::BadInput => 5,
            GeneralKind::TimedOut => 6,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            GeneralKind::InvalidData => "invalid data",
            GeneralKind::NotConnected => "not connected",
            GeneralKind::NotAvailable => "not available",
            GeneralKind::BadProxyType => "bad proxy type",
            GeneralKind::BadInput => "bad input",
            GeneralKind::TimedOut => "timed out",
        }
    }
}

/// Why a SOCKS5 server refused to authenticate us
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5AuthFailure {
    /// The server chose username/password but no credentials were configured
    AuthRequired,
    /// The server answered the method offer with 0xFF
    MethodsRejected,
    /// RFC 1929 sub-negotiation returned a non-zero status
    BadCredentials,
}

impl Socks5AuthFailure {
    pub fn code(self) -> u8 {
        match self {
            Socks5AuthFailure::AuthRequired => 1,
            Socks5AuthFailure::MethodsRejected => 2,
            Socks5AuthFailure::BadCredentials => 3,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Socks5AuthFailure::AuthRequired => "authentication is required",
            Socks5AuthFailure::MethodsRejected => "all offered authentication methods were rejected",
            Socks5AuthFailure::BadCredentials => "unknown username or invalid password",
        }
    }
}

/// Error returned when a tunnel cannot be established.
///
/// The stream used for the attempt has already been shut down by the time
/// one of these reaches the caller. Nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProxyError {
    #[error("{}", .0.reason())]
    General(GeneralKind),

    #[error("SOCKS5 authentication failed: {}", .0.reason())]
    Socks5Auth(Socks5AuthFailure),

    #[error("SOCKS5 request failed: {}", .0.reason())]
    Socks5(Socks5Reply),

    #[error("SOCKS4 request failed: {}", .0.reason())]
    Socks4(Socks4Reply),

    #[error("HTTP proxy returned {status}: {reason}")]
    Http { status: u16, reason: String },
}

impl ProxyError {
    pub fn invalid_data() -> Self {
        ProxyError::General(GeneralKind::InvalidData)
    }

    pub fn not_connected() -> Self {
        ProxyError::General(GeneralKind::NotConnected)
    }

    pub fn bad_input() -> Self {
        ProxyError::General(GeneralKind::BadInput)
    }

    /// Numeric code as defined by the protocol (or the general table)
    pub fn code(&self) -> u16 {
        match self {
            ProxyError::General(kind) => kind.code().into(),
            ProxyError::Socks5Auth(failure) => failure.code().into(),
            ProxyError::Socks5(reply) => reply.code().into(),
            ProxyError::Socks4(reply) => reply.code().into(),
            ProxyError::Http { status, .. } => *status,
        }
    }

    /// Human readable reason, without the variant prefix
    pub fn reason(&self) -> &str {
        match self {
            ProxyError::General(kind) => kind.reason(),
            ProxyError::Socks5Auth(failure) => failure.reason(),
            ProxyError::Socks5(reply) => reply.reason(),
            ProxyError::Socks4(reply) => reply.reason(),
            ProxyError::Http { reason, .. } => reason,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProxyError::General(GeneralKind::TimedOut))
    }
}

impl From<GeneralKind> for ProxyError {
    fn from(kind: GeneralKind) -> Self {
        ProxyError::General(kind)
    }
}
