//! Tunnel Connector
//!
//! Composition of a [`Dialer`] and the protocol negotiators into a single
//! "open a stream to (host, port)" operation.

pub mod dialer;
pub mod stream;
pub mod tunnel;

pub use dialer::{Dialer, TcpDialer};
pub use stream::ProxiedStream;
pub use tunnel::ProxyConnector;
