//! Client Session
//!
//! Drives one accepted connection through handshake, request, dial and relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::protocol::{Reply, Socks5Handler, Socks5Response};
use crate::relay::{RelayEngine, RelaySession, RelayStats};
use crate::Result;

/// How long a rejected client gets to finish sending before its socket is released
const REJECT_LINGER: Duration = Duration::from_secs(1);

/// Where a session is in the SOCKS5 exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    AwaitingRequest,
    Connecting,
    Relaying,
    Closed,
}

/// How a session that did not hit a protocol or transport error ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// CONNECT succeeded and the relay wound down
    Relayed(RelayStats),
    /// An error reply was sent before closing
    Rejected(Reply),
}

/// One accepted client connection
pub struct ClientSession {
    connection_id: String,
    peer_addr: SocketAddr,
    engine: RelayEngine,
    state: SessionState,
}

impl ClientSession {
    pub fn new(connection_id: impl Into<String>, peer_addr: SocketAddr, engine: RelayEngine) -> Self {
        Self {
            connection_id: connection_id.into(),
            peer_addr,
            engine,
            state: SessionState::AwaitingHandshake,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state change");
        self.state = next;
    }

    /// Run the session to completion.
    ///
    /// Every path ends in [`SessionState::Closed`] with both sockets dropped.
    /// An `Err` means the connection was dropped without a reply.
    pub async fn run(mut self, stream: TcpStream) -> Result<SessionOutcome> {
        let result = self.drive(stream).await;
        self.transition(SessionState::Closed);
        result
    }

    async fn drive(&mut self, stream: TcpStream) -> Result<SessionOutcome> {
        let mut handler = Socks5Handler::new(stream);

        handler
            .handle_handshake()
            .await
            .context("SOCKS5 handshake failed")?;
        self.transition(SessionState::AwaitingRequest);

        let request = match handler.read_request().await {
            Ok(request) => request,
            Err(e) => match e.reply() {
                Some(reply) => {
                    warn!("Rejecting request from {}: {}", self.peer_addr, e);
                    return Self::reject(handler, reply).await;
                }
                None => return Err(e).context("Failed to read SOCKS5 request"),
            },
        };
        debug!(
            command = request.command(),
            address_type = request.address_type(),
            "SOCKS5 request received from {}: {}",
            self.peer_addr,
            request
        );
        self.transition(SessionState::Connecting);

        let target = match self.engine.connect_to_target(&request).await {
            Ok(target) => target,
            Err(e) => {
                warn!("{:#}", e);
                return Self::reject(handler, Reply::ConnectFailure).await;
            }
        };

        let bound_addr = target.local_addr().context("Failed to get outbound local address")?;
        let target_addr = target.peer_addr().context("Failed to get target address")?;
        handler
            .send_response(Socks5Response::from_bound_addr(bound_addr))
            .await
            .context("Failed to send SOCKS5 success response")?;
        self.transition(SessionState::Relaying);

        info!(
            "Starting data relay for connection {} from {} to {}",
            self.connection_id, self.peer_addr, request
        );
        let session = Arc::new(RelaySession::new(
            self.connection_id.clone(),
            self.peer_addr,
            target_addr,
        ));
        let stats = self.engine.relay(session, handler.into_stream(), target).await;

        Ok(SessionOutcome::Relayed(stats))
    }

    /// Send the error reply, then close so the client reads EOF after it
    async fn reject(mut handler: Socks5Handler<TcpStream>, reply: Reply) -> Result<SessionOutcome> {
        handler
            .send_response(Socks5Response::error(reply))
            .await
            .context("Failed to send SOCKS5 error response")?;

        if let Err(e) = handler.close_after_reply(REJECT_LINGER).await {
            debug!("Client closed before rejection finished: {}", e);
        }
        Ok(SessionOutcome::Rejected(reply))
    }
}
