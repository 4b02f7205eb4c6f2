//! Connection Management Module
//!
//! Handles TCP connection acceptance and the per-connection SOCKS5 session.

pub mod manager;
pub mod session;

pub use manager::{ConnectionManager, ServerStats};
pub use session::{ClientSession, SessionOutcome, SessionState};
