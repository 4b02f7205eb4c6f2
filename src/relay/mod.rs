//! Data Relay Module
//!
//! Handles target dialing and bidirectional data relay between client and target.

pub mod engine;
pub mod session;

pub use engine::{Direction, DirectionEnd, RelayEngine, DEFAULT_BUFFER_SIZE};
pub use session::{RelaySession, RelayStats};
