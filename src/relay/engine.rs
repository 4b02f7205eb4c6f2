//! Relay Engine

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::session::{RelaySession, RelayStats};
use crate::protocol::{Socks5Request, TargetAddr};
use crate::Result;

/// Default per-direction copy buffer
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Which way bytes flow through a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// client to target
    Upstream,
    /// target to client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("client -> target"),
            Direction::Downstream => f.write_str("target -> client"),
        }
    }
}

/// Why one copy direction stopped
#[derive(Debug)]
pub enum DirectionEnd {
    /// The source reached end-of-stream
    Eof,
    /// The opposite direction finished first and the pair was closed
    Cancelled,
    /// The socket was already closed or reset by the peer
    PeerClosed(io::Error),
    /// Any other read or write failure
    Failed(io::Error),
}

impl DirectionEnd {
    /// Classify an I/O error by kind, never by message text
    pub fn from_io_error(err: io::Error) -> Self {
        if is_peer_closed(&err) {
            DirectionEnd::PeerClosed(err)
        } else {
            DirectionEnd::Failed(err)
        }
    }

    /// Everything except a genuine I/O failure is a normal way for a relay to end
    pub fn is_expected(&self) -> bool {
        !matches!(self, DirectionEnd::Failed(_))
    }
}

/// Error kinds produced when the other side (or the other relay direction)
/// has already torn the connection down
pub fn is_peer_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Completion report sent by each copy task
#[derive(Debug)]
pub struct DirectionReport {
    pub direction: Direction,
    pub end: DirectionEnd,
}

/// Dials targets and relays data between client and target connections
#[derive(Debug, Clone)]
pub struct RelayEngine {
    buffer_size: usize,
    connect_timeout: Option<Duration>,
}

impl Default for RelayEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayEngine {
    /// Create a relay engine with the default buffer and no dial timeout
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: None,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Option<Duration>) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Create a new relay engine from configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new()
            .with_buffer_size(config.server.buffer_size)
            .with_connect_timeout(config.server.connect_timeout)
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Open a TCP connection to the requested destination.
    ///
    /// Domain names are resolved by the system resolver. There is a single
    /// dial attempt; a failure is returned to the caller as is.
    pub async fn connect_to_target(&self, request: &Socks5Request) -> Result<TcpStream> {
        debug!("Attempting to connect to target: {}", request);

        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, dial(request))
                .await
                .map_err(|_| anyhow!("Connection to {} timed out after {:?}", request, limit))?,
            None => dial(request).await,
        }
        .with_context(|| format!("Failed to connect to target {}", request))?;

        if let Ok(peer) = stream.peer_addr() {
            info!("Connected to target {} (resolved to {})", request, peer);
        }
        Ok(stream)
    }

    /// Relay data bidirectionally between client and target.
    ///
    /// Two copy tasks run concurrently. When the first one stops, the other is
    /// told to close; this returns only after both have reported, by which
    /// point every half of both sockets has been dropped.
    pub async fn relay(&self, session: Arc<RelaySession>, client: TcpStream, target: TcpStream) -> RelayStats {
        info!("Starting bidirectional data relay for session {}", session.session_id);

        let (client_read, client_write) = client.into_split();
        let (target_read, target_write) = target.into_split();

        let (done_tx, mut done_rx) = mpsc::channel(2);
        let (close_tx, close_rx) = watch::channel(false);

        tokio::spawn(pipe(
            client_read,
            target_write,
            Direction::Upstream,
            self.buffer_size,
            Arc::clone(&session),
            close_rx.clone(),
            done_tx.clone(),
        ));
        tokio::spawn(pipe(
            target_read,
            client_write,
            Direction::Downstream,
            self.buffer_size,
            Arc::clone(&session),
            close_rx,
            done_tx,
        ));

        if let Some(first) = done_rx.recv().await {
            log_report(&session, &first);
        }
        // closing is a no-op if the second direction already stopped
        let _ = close_tx.send(true);
        if let Some(second) = done_rx.recv().await {
            log_report(&session, &second);
        }

        session.log_stats();
        session.to_stats()
    }

    /// Relay between two streams, tracking the session under the given id
    pub async fn start_relay(&self, session_id: &str, client: TcpStream, target: TcpStream) -> Result<RelayStats> {
        let client_addr = client.peer_addr().context("Failed to get client address")?;
        let target_addr = target.peer_addr().context("Failed to get target address")?;

        let session = Arc::new(RelaySession::new(session_id, client_addr, target_addr));
        Ok(self.relay(session, client, target).await)
    }
}

async fn dial(request: &Socks5Request) -> io::Result<TcpStream> {
    match &request.target_addr {
        TargetAddr::Ipv4(ip) => TcpStream::connect(SocketAddr::from((*ip, request.target_port))).await,
        TargetAddr::Domain(domain) => TcpStream::connect((domain.as_str(), request.target_port)).await,
    }
}

fn log_report(session: &RelaySession, report: &DirectionReport) {
    match &report.end {
        DirectionEnd::Failed(e) => warn!(
            "Relay session {} ({}) failed: {}",
            session.session_id, report.direction, e
        ),
        DirectionEnd::PeerClosed(e) => debug!(
            "Relay session {} ({}) closed by peer: {}",
            session.session_id, report.direction, e
        ),
        end => debug!("Relay session {} ({}) finished: {:?}", session.session_id, report.direction, end),
    }
}

/// One copy direction. Runs until its own copy ends or the pair is closed,
/// drops both socket halves, then reports.
async fn pipe<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    buffer_size: usize,
    session: Arc<RelaySession>,
    mut close_rx: watch::Receiver<bool>,
    done_tx: mpsc::Sender<DirectionReport>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let end = tokio::select! {
        end = copy_until_end(&mut reader, &mut writer, direction, buffer_size, &session) => end,
        _ = close_rx.changed() => DirectionEnd::Cancelled,
    };

    drop(reader);
    drop(writer);

    let _ = done_tx.send(DirectionReport { direction, end }).await;
}

async fn copy_until_end<R, W>(
    reader: &mut R,
    writer: &mut W,
    direction: Direction,
    buffer_size: usize,
    session: &RelaySession,
) -> DirectionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return DirectionEnd::Eof,
            Ok(n) => n,
            Err(e) => return DirectionEnd::from_io_error(e),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            return DirectionEnd::from_io_error(e);
        }

        match direction {
            Direction::Upstream => session.add_bytes_up(n as u64),
            Direction::Downstream => session.add_bytes_down(n as u64),
        }
    }
}
