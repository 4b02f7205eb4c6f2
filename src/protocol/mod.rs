//! SOCKS5 Protocol Implementation
//!
//! Wire codec, message types and the stream-level handler used by each
//! client session.

pub mod codec;
pub mod constants;
pub mod error;
pub mod handler;
pub mod types;

pub use constants::*;
pub use error::Socks5Error;
pub use handler::Socks5Handler;
pub use types::*;
