//! Tunnel Negotiation Types

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::protocol::constants::*;

/// Destination address as it goes on the wire.
///
/// IPv6 literals are not representable; a host that is not a dotted IPv4
/// literal is always treated as a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Domain(String),
}

impl TargetAddr {
    /// Parse as a dotted IPv4 literal, else treat as a name
    pub fn parse(host: &str) -> Self {
        match host.parse::<Ipv4Addr>() {
            Ok(ip) => TargetAddr::Ipv4(ip),
            Err(_) => TargetAddr::Domain(host.to_string()),
        }
    }

    /// Get the SOCKS5 address type code for this address
    pub fn address_type(&self) -> u8 {
        match self {
            TargetAddr::Ipv4(_) => SOCKS5_ADDR_IPV4,
            TargetAddr::Domain(_) => SOCKS5_ADDR_DOMAIN,
        }
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ipv4(ip) => write!(f, "{}", ip),
            TargetAddr::Domain(domain) => f.write_str(domain),
        }
    }
}

/// Where the tunnel should end up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    /// Create a destination, rejecting an empty host, line breaks in it, or port 0
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ProxyError> {
        let host = host.into();
        if host.is_empty() || has_line_break(&host) || port == 0 {
            return Err(ProxyError::bad_input());
        }
        Ok(Self { host, port })
    }

    pub fn target(&self) -> TargetAddr {
        TargetAddr::parse(&self.host)
    }
}

/// CR or LF would end a header line in an HTTP CONNECT request
pub(crate) fn has_line_break(host: &str) -> bool {
    host.contains(['\r', '\n'])
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Outcome of a successful handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationResult {
    /// Address the proxy reported binding for us
    pub bound_address: String,
    pub bound_port: u16,
    /// Destination as the proxy was asked for it (resolved IP or unresolved name)
    pub peer_address: String,
    pub peer_port: u16,
}

/// SOCKS5 method chosen by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    NoAuth,
    UserPass,
    NoAcceptable,
    Other(u8),
}

impl AuthMethod {
    /// Convert to method code
    pub fn method_code(&self) -> u8 {
        match self {
            AuthMethod::NoAuth => SOCKS5_AUTH_NONE,
            AuthMethod::UserPass => SOCKS5_AUTH_USERPASS,
            AuthMethod::NoAcceptable => SOCKS5_AUTH_UNSUPPORTED,
            AuthMethod::Other(code) => *code,
        }
    }

    /// Create from method code
    pub fn from_code(code: u8) -> Self {
        match code {
            SOCKS5_AUTH_NONE => AuthMethod::NoAuth,
            SOCKS5_AUTH_USERPASS => AuthMethod::UserPass,
            SOCKS5_AUTH_UNSUPPORTED => AuthMethod::NoAcceptable,
            other => AuthMethod::Other(other),
        }
    }
}

/// SOCKS5 REP field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks5Reply {
    Succeeded,
    GeneralFailure,
    ConnectionNotAllowed,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TtlExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    /// Anything above 8
    Unknown,
}

impl Socks5Reply {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Socks5Reply::Succeeded,
            1 => Socks5Reply::GeneralFailure,
            2 => Socks5Reply::ConnectionNotAllowed,
            3 => Socks5Reply::NetworkUnreachable,
            4 => Socks5Reply::HostUnreachable,
            5 => Socks5Reply::ConnectionRefused,
            6 => Socks5Reply::TtlExpired,
            7 => Socks5Reply::CommandNotSupported,
            8 => Socks5Reply::AddressTypeNotSupported,
            _ => Socks5Reply::Unknown,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Socks5Reply::Succeeded => 0,
            Socks5Reply::GeneralFailure => 1,
            Socks5Reply::ConnectionNotAllowed => 2,
            Socks5Reply::NetworkUnreachable => 3,
            Socks5Reply::HostUnreachable => 4,
            Socks5Reply::ConnectionRefused => 5,
            Socks5Reply::TtlExpired => 6,
            Socks5Reply::CommandNotSupported => 7,
            Socks5Reply::AddressTypeNotSupported => 8,
            Socks5Reply::Unknown => 9,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Socks5Reply::Succeeded => "succeeded",
            Socks5Reply::GeneralFailure => "general SOCKS server failure",
            Socks5Reply::ConnectionNotAllowed => "connection not allowed by ruleset",
            Socks5Reply::NetworkUnreachable => "network unreachable",
            Socks5Reply::HostUnreachable => "host unreachable",
            Socks5Reply::ConnectionRefused => "connection refused",
            Socks5Reply::TtlExpired => "TTL expired",
            Socks5Reply::CommandNotSupported => "command not supported",
            Socks5Reply::AddressTypeNotSupported => "address type not supported",
            Socks5Reply::Unknown => "unknown error",
        }
    }
}

/// SOCKS4 CD field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Socks4Reply {
    Granted,
    Rejected,
    IdentdUnreachable,
    IdentdMismatch,
    Unknown,
}

impl Socks4Reply {
    pub fn from_code(code: u8) -> Self {
        match code {
            SOCKS4_REPLY_GRANTED => Socks4Reply::Granted,
            SOCKS4_REPLY_REJECTED => Socks4Reply::Rejected,
            SOCKS4_REPLY_NO_IDENTD => Socks4Reply::IdentdUnreachable,
            SOCKS4_REPLY_IDENTD_MISMATCH => Socks4Reply::IdentdMismatch,
            _ => Socks4Reply::Unknown,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Socks4Reply::Granted => 90,
            Socks4Reply::Rejected => 91,
            Socks4Reply::IdentdUnreachable => 92,
            Socks4Reply::IdentdMismatch => 93,
            Socks4Reply::Unknown => 94,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Socks4Reply::Granted => "request granted",
            Socks4Reply::Rejected => "request rejected or failed",
            Socks4Reply::IdentdUnreachable => {
                "request rejected because SOCKS server cannot connect to identd on the client"
            }
            Socks4Reply::IdentdMismatch => {
                "request rejected because the client program and identd report different user-ids"
            }
            Socks4Reply::Unknown => "unknown error",
        }
    }
}
