//! SOCKS5 wire codec
//!
//! Stateless conversions between raw bytes and protocol structures. The
//! [`Socks5Handler`](super::Socks5Handler) decides how many bytes to read and
//! feeds them through these functions.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use super::constants::*;
use super::error::Socks5Error;
use super::types::{Reply, Socks5Request, Socks5Response, TargetAddr};

/// Split `n` bytes off the front of `buf`, treating a short buffer as a short read
fn take(buf: &[u8], n: usize) -> Result<(&[u8], &[u8]), Socks5Error> {
    if buf.len() < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, got {}", n, buf.len()),
        )
        .into());
    }
    Ok(buf.split_at(n))
}

/// Parse `VER NMETHODS` and return the number of method bytes that follow
pub fn parse_handshake(header: &[u8]) -> Result<usize, Socks5Error> {
    let (header, _) = take(header, SOCKS5_HANDSHAKE_HEADER_LEN)?;
    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }
    Ok(header[1] as usize)
}

/// The method selection reply. No authentication is always chosen.
pub fn encode_handshake_reply() -> [u8; 2] {
    [SOCKS5_VERSION, SOCKS5_AUTH_NONE]
}

/// Validate `VER CMD RSV ATYP` and return the address type.
///
/// Checks run in wire order of severity: version and reserved byte first
/// (malformed input), then command and address type (unsupported input).
pub fn parse_request_header(header: &[u8]) -> Result<u8, Socks5Error> {
    let (header, _) = take(header, SOCKS5_REQUEST_HEADER_LEN)?;
    let (version, command, reserved, address_type) = (header[0], header[1], header[2], header[3]);

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version));
    }
    if reserved != SOCKS5_RESERVED {
        return Err(Socks5Error::InvalidReserved(reserved));
    }
    if command != SOCKS5_CMD_CONNECT {
        return Err(Socks5Error::UnsupportedCommand(command));
    }
    match address_type {
        SOCKS5_ADDR_IPV4 | SOCKS5_ADDR_DOMAIN => Ok(address_type),
        _ => Err(Socks5Error::AddressTypeNotSupported(address_type)),
    }
}

/// Decode 4 address octets followed by a big-endian port
pub fn decode_ipv4_address(buf: &[u8]) -> Result<(TargetAddr, u16), Socks5Error> {
    let (buf, _) = take(buf, SOCKS5_IPV4_ADDR_LEN)?;
    let ip = Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]);
    let port = u16::from_be_bytes([buf[4], buf[5]]);
    Ok((TargetAddr::Ipv4(ip), port))
}

/// Decode `domain_len` bytes of domain name followed by a big-endian port
pub fn decode_domain_address(buf: &[u8], domain_len: usize) -> Result<(TargetAddr, u16), Socks5Error> {
    let (domain, rest) = take(buf, domain_len)?;
    let (port, _) = take(rest, 2)?;
    let domain = std::str::from_utf8(domain).map_err(|_| Socks5Error::InvalidDomainEncoding)?;
    Ok((
        TargetAddr::Domain(domain.to_owned()),
        u16::from_be_bytes([port[0], port[1]]),
    ))
}

/// Parse a complete request held in one contiguous buffer
pub fn parse_request(bytes: &[u8]) -> Result<Socks5Request, Socks5Error> {
    let (header, rest) = take(bytes, SOCKS5_REQUEST_HEADER_LEN)?;
    let (target_addr, target_port) = match parse_request_header(header)? {
        SOCKS5_ADDR_IPV4 => decode_ipv4_address(rest)?,
        _ => {
            let (len, rest) = take(rest, 1)?;
            decode_domain_address(rest, len[0] as usize)?
        }
    };
    Ok(Socks5Request::new(target_addr, target_port))
}

/// Encode `VER REP RSV ATYP BND.ADDR BND.PORT`, always as IPv4
pub fn encode_reply(response: &Socks5Response) -> [u8; SOCKS5_REPLY_LEN] {
    let mut buf = [0u8; SOCKS5_REPLY_LEN];
    buf[0] = SOCKS5_VERSION;
    buf[1] = response.reply.as_u8();
    buf[2] = SOCKS5_RESERVED;
    buf[3] = SOCKS5_ADDR_IPV4;
    buf[4..8].copy_from_slice(&response.bind_addr.ip().octets());
    buf[8..10].copy_from_slice(&response.bind_addr.port().to_be_bytes());
    buf
}

/// Decode a reply produced by [`encode_reply`]
pub fn decode_reply(bytes: &[u8]) -> Result<Socks5Response, Socks5Error> {
    let (buf, _) = take(bytes, SOCKS5_REPLY_LEN)?;
    if buf[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(buf[0]));
    }
    if buf[2] != SOCKS5_RESERVED {
        return Err(Socks5Error::InvalidReserved(buf[2]));
    }
    if buf[3] != SOCKS5_ADDR_IPV4 {
        return Err(Socks5Error::AddressTypeNotSupported(buf[3]));
    }
    let ip = Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]);
    let port = u16::from_be_bytes([buf[8], buf[9]]);
    Ok(Socks5Response {
        reply: Reply::from_u8(buf[1]),
        bind_addr: SocketAddrV4::new(ip, port),
    })
}
