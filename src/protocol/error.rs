//! SOCKS5 Protocol Errors

use std::io;

use super::types::Reply;

/// Failures raised while reading or decoding client messages
#[derive(Debug, thiserror::Error)]
pub enum Socks5Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("unsupported socks version {0:#x}")]
    UnsupportedVersion(u8),
    #[error("invalid reserved field {0:#x}")]
    InvalidReserved(u8),
    #[error("unsupported command {0:#x}")]
    UnsupportedCommand(u8),
    #[error("address type {0:#x} not supported")]
    AddressTypeNotSupported(u8),
    #[error("address domain name must be UTF-8 encoding")]
    InvalidDomainEncoding,
}

impl Socks5Error {
    /// The reply a client should receive before the connection is dropped.
    ///
    /// Only well-formed but unsupported requests get one; malformed input and
    /// transport failures close the connection silently.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            Socks5Error::UnsupportedCommand(_) => Some(Reply::CommandNotSupported),
            Socks5Error::AddressTypeNotSupported(_) => Some(Reply::AddressTypeNotSupported),
            _ => None,
        }
    }

    /// Whether the failure came from the transport rather than the peer's bytes
    pub fn is_transport(&self) -> bool {
        matches!(self, Socks5Error::Io(_))
    }
}
