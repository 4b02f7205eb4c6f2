//! SOCKS5 Protocol Handler

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

use super::codec;
use super::constants::*;
use super::error::Socks5Error;
use super::types::{Socks5Request, Socks5Response};

/// SOCKS5 protocol handler for a client connection
pub struct Socks5Handler<S> {
    stream: S,
}

impl<S> Socks5Handler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new SOCKS5 handler for the given stream
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read the greeting and answer with "no authentication required".
    ///
    /// The offered method list is consumed but never inspected.
    pub async fn handle_handshake(&mut self) -> Result<(), Socks5Error> {
        let mut header = [0u8; SOCKS5_HANDSHAKE_HEADER_LEN];
        self.stream.read_exact(&mut header).await?;
        let n_methods = codec::parse_handshake(&header)?;

        let mut methods = vec![0u8; n_methods];
        self.stream.read_exact(&mut methods).await?;
        trace!(?methods, "client offered authentication methods");

        self.stream.write_all(&codec::encode_handshake_reply()).await?;
        Ok(())
    }

    /// Read the connection request from client
    pub async fn read_request(&mut self) -> Result<Socks5Request, Socks5Error> {
        let mut header = [0u8; SOCKS5_REQUEST_HEADER_LEN];
        self.stream.read_exact(&mut header).await?;

        let (target_addr, target_port) = match codec::parse_request_header(&header)? {
            SOCKS5_ADDR_IPV4 => {
                let mut buf = [0u8; SOCKS5_IPV4_ADDR_LEN];
                self.stream.read_exact(&mut buf).await?;
                codec::decode_ipv4_address(&buf)?
            }
            _ => {
                let domain_len = self.stream.read_u8().await? as usize;
                let mut buf = vec![0u8; domain_len + 2];
                self.stream.read_exact(&mut buf).await?;
                codec::decode_domain_address(&buf, domain_len)?
            }
        };

        Ok(Socks5Request::new(target_addr, target_port))
    }

    /// Send response to client
    pub async fn send_response(&mut self, response: Socks5Response) -> std::io::Result<()> {
        self.stream.write_all(&codec::encode_reply(&response)).await?;
        self.stream.flush().await
    }

    /// Close after a final error reply.
    ///
    /// The write side is shut down first, then anything the client already
    /// pipelined is read and discarded for up to `linger`, so the socket is
    /// released with no unread data and the client sees EOF rather than a reset.
    pub async fn close_after_reply(mut self, linger: Duration) -> io::Result<usize> {
        self.stream.shutdown().await?;

        let mut discarded = 0;
        let mut sink = [0u8; 256];
        let drain = async {
            loop {
                match self.stream.read(&mut sink).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => discarded += n,
                }
            }
        };
        let _ = timeout(linger, drain).await;

        trace!(discarded, "closed after error reply");
        Ok(discarded)
    }

    /// Get the underlying stream back for relaying
    pub fn into_stream(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Reply, TargetAddr};
    use std::net::Ipv4Addr;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_handshake_replies_no_auth() {
        let stream = Builder::new()
            .read(&[0x05, 0x02])
            .read(&[0x00, 0x02])
            .write(&[0x05, 0x00])
            .build();
        let mut handler = Socks5Handler::new(stream);
        handler.handle_handshake().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_with_empty_method_list() {
        let stream = Builder::new().read(&[0x05, 0x00]).write(&[0x05, 0x00]).build();
        let mut handler = Socks5Handler::new(stream);
        handler.handle_handshake().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_bad_version_writes_nothing() {
        // the mock panics on any unexpected write
        let stream = Builder::new().read(&[0x04, 0x01]).build();
        let mut handler = Socks5Handler::new(stream);
        let err = handler.handle_handshake().await.unwrap_err();
        assert!(matches!(err, Socks5Error::UnsupportedVersion(0x04)));
    }

    #[tokio::test]
    async fn test_handshake_short_read() {
        let stream = Builder::new().read(&[0x05, 0x03, 0x00]).build();
        let mut handler = Socks5Handler::new(stream);
        let err = handler.handle_handshake().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_read_domain_request_in_pieces() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x00, 0x03])
            .read(&[11])
            .read(b"example")
            .read(b".com")
            .read(&[0x01, 0xbb])
            .build();
        let mut handler = Socks5Handler::new(stream);
        let req = handler.read_request().await.unwrap();
        assert_eq!(req.target_addr, TargetAddr::Domain("example.com".into()));
        assert_eq!(req.target_port, 443);
    }

    #[tokio::test]
    async fn test_read_ipv4_request() {
        let stream = Builder::new()
            .read(&[0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50])
            .build();
        let mut handler = Socks5Handler::new(stream);
        let req = handler.read_request().await.unwrap();
        assert_eq!(req.target_addr, TargetAddr::Ipv4(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(req.to_string(), "93.184.216.34:80");
    }

    #[tokio::test]
    async fn test_unsupported_command_stops_after_header() {
        // no address bytes are consumed once the command is rejected
        let stream = Builder::new().read(&[0x05, 0x03, 0x00, 0x01]).build();
        let mut handler = Socks5Handler::new(stream);
        let err = handler.read_request().await.unwrap_err();
        assert_eq!(err.reply(), Some(Reply::CommandNotSupported));
    }

    #[tokio::test]
    async fn test_send_error_response() {
        let stream = Builder::new()
            .write(&[0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .build();
        let mut handler = Socks5Handler::new(stream);
        handler
            .send_response(Socks5Response::error(Reply::AddressTypeNotSupported))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_after_reply_discards_pipelined_bytes() {
        // address bytes and early payload sent along with a rejected request
        let stream = Builder::new()
            .read(&[127, 0, 0, 1, 0x1f, 0x90])
            .read(b"GET /")
            .build();
        let handler = Socks5Handler::new(stream);
        let discarded = handler.close_after_reply(Duration::from_secs(1)).await.unwrap();
        assert_eq!(discarded, 11);
    }

    #[tokio::test]
    async fn test_close_after_reply_on_quiet_client() {
        let stream = Builder::new().build();
        let handler = Socks5Handler::new(stream);
        assert_eq!(handler.close_after_reply(Duration::from_secs(1)).await.unwrap(), 0);
    }
}
