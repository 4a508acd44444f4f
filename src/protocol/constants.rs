//! SOCKS and HTTP CONNECT Protocol Constants

// SOCKS5 Protocol Version
pub const SOCKS5_VERSION: u8 = 0x05;

// SOCKS5 Commands
pub const SOCKS5_CMD_CONNECT: u8 = 0x01;

// Address Types
pub const SOCKS5_ADDR_IPV4: u8 = 0x01;
pub const SOCKS5_ADDR_DOMAIN: u8 = 0x03;

// Authentication Methods
pub const SOCKS5_AUTH_NONE: u8 = 0x00;
pub const SOCKS5_AUTH_USERPASS: u8 = 0x02;
pub const SOCKS5_AUTH_UNSUPPORTED: u8 = 0xFF;

// Response Codes
pub const SOCKS5_REPLY_SUCCESS: u8 = 0x00;

// Reserved field value
pub const SOCKS5_RESERVED: u8 = 0x00;

// Username/Password authentication version
pub const SOCKS5_USERPASS_VERSION: u8 = 0x01;

// Username/Password authentication status codes
pub const SOCKS5_USERPASS_SUCCESS: u8 = 0x00;

// SOCKS4 Protocol Version (request) and reply version
pub const SOCKS4_VERSION: u8 = 0x04;
pub const SOCKS4_REPLY_VERSION: u8 = 0x00;
pub const SOCKS4_CMD_CONNECT: u8 = 0x01;

// SOCKS4 reply codes
pub const SOCKS4_REPLY_GRANTED: u8 = 0x5A;
pub const SOCKS4_REPLY_REJECTED: u8 = 0x5B;
pub const SOCKS4_REPLY_NO_IDENTD: u8 = 0x5C;
pub const SOCKS4_REPLY_IDENTD_MISMATCH: u8 = 0x5D;

// SOCKS4a sentinel destination (0.0.0.x, x != 0)
pub const SOCKS4A_SENTINEL: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

// Default proxy ports
pub const DEFAULT_SOCKS_PORT: u16 = 1080;
pub const DEFAULT_HTTP_PORT: u16 = 8080;

// HTTP CONNECT framing
pub const HTTP_HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
pub const HTTP_MAX_HEADER_SIZE: usize = 8192;
