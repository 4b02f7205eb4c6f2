//! SOCKS5 Protocol Types

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::protocol::constants::*;

/// SOCKS5 reply codes this server emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Succeeded,
    ConnectFailure,
    CommandNotSupported,
    AddressTypeNotSupported,
    Other(u8),
}

impl Reply {
    #[rustfmt::skip]
    pub fn as_u8(self) -> u8 {
        match self {
            Reply::Succeeded               => SOCKS5_REPLY_SUCCESS,
            Reply::ConnectFailure          => SOCKS5_REPLY_CONNECT_FAILURE,
            Reply::CommandNotSupported     => SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
            Reply::AddressTypeNotSupported => SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
            Reply::Other(code)             => code,
        }
    }

    #[rustfmt::skip]
    pub fn from_u8(code: u8) -> Self {
        match code {
            SOCKS5_REPLY_SUCCESS                    => Reply::Succeeded,
            SOCKS5_REPLY_CONNECT_FAILURE            => Reply::ConnectFailure,
            SOCKS5_REPLY_COMMAND_NOT_SUPPORTED      => Reply::CommandNotSupported,
            SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED => Reply::AddressTypeNotSupported,
            _                                       => Reply::Other(code),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Succeeded => write!(f, "Succeeded"),
            Reply::ConnectFailure => write!(f, "Connect failure"),
            Reply::CommandNotSupported => write!(f, "Command not supported"),
            Reply::AddressTypeNotSupported => write!(f, "Address type not supported"),
            Reply::Other(code) => write!(f, "Other reply ({:#x})", code),
        }
    }
}

/// Destination address types this server accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddr {
    Ipv4(Ipv4Addr),
    Domain(String),
}

impl TargetAddr {
    /// Get the address type code for this address
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

/// A parsed CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socks5Request {
    pub target_addr: TargetAddr,
    pub target_port: u16,
}

impl Socks5Request {
    pub fn new(target_addr: TargetAddr, target_port: u16) -> Self {
        Self {
            target_addr,
            target_port,
        }
    }

    /// Only CONNECT survives parsing
    pub fn command(&self) -> u8 {
        SOCKS5_CMD_CONNECT
    }

    pub fn address_type(&self) -> u8 {
        self.target_addr.address_type()
    }
}

impl fmt::Display for Socks5Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_addr, self.target_port)
    }
}

/// SOCKS5 Response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Socks5Response {
    pub reply: Reply,
    pub bind_addr: SocketAddrV4,
}

impl Socks5Response {
    /// Create a success response
    pub fn success(bind_addr: SocketAddrV4) -> Self {
        Self {
            reply: Reply::Succeeded,
            bind_addr,
        }
    }

    /// Create an error response with zero-filled address and port
    pub fn error(reply: Reply) -> Self {
        Self {
            reply,
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
        }
    }

    /// Build a success response from the outbound socket's local address.
    ///
    /// Replies only carry IPv4. An IPv4-mapped IPv6 address is unwrapped,
    /// any other IPv6 address is reported as `0.0.0.0` with its port.
    pub fn from_bound_addr(addr: SocketAddr) -> Self {
        let ip = match addr {
            SocketAddr::V4(v4) => *v4.ip(),
            SocketAddr::V6(v6) => v6.ip().to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
        };
        Self::success(SocketAddrV4::new(ip, addr.port()))
    }
}
