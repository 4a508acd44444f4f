//! Proxy Handshake Protocols
//!
//! Client sides of SOCKS5, SOCKS4/4a and HTTP CONNECT. Each negotiator drives
//! one stream through a strictly sequential request/reply exchange and either
//! hands the stream back ready for application data or closes it.

pub mod codec;
pub mod constants;
pub mod http;
pub mod io;
pub mod socks4;
pub mod socks5;
pub mod types;

pub use constants::*;
pub use http::HttpConnectNegotiator;
pub use io::ExactReader;
pub use socks4::Socks4Negotiator;
pub use socks5::Socks5Negotiator;
pub use types::*;
