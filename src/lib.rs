//! tinysocks
//!
//! A minimal SOCKS5 proxy server: no-authentication negotiation, the CONNECT
//! command, and IPv4 or domain-name destinations, relayed over plain TCP.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod relay;
pub mod shutdown;

pub use config::Config;
pub use connection::ConnectionManager;
pub use relay::RelayEngine;
pub use shutdown::ShutdownCoordinator;

/// Common error type for the proxy server
pub type Result<T> = anyhow::Result<T>;
