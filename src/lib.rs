//! Client for the legacy realtime collaboration protocol used by
//! Overleaf-style document servers: a socket.io-0.9 dialect framing scheme
//! over one persistent duplex channel, with remote calls correlated by
//! packet number.
//!
//! The HTTP bootstrap that authenticates and hands out the channel key is
//! outside this crate; [`Session::start`](session::Session::start) takes an
//! already-open [`Transport`](transport::Transport).

pub mod config;
pub mod logs;
pub mod mangle;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use logs::extract_log_messages;
pub use mangle::unmangle;
pub use session::{Session, SessionError};
