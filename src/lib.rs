//! Lily - a secure multi-tenant network file server.
//!
//! A Lily process exposes named *drives* (host-directory backed stores) to
//! remote clients over a length-framed binary protocol carried on TLS.
//! Clients authenticate as users (password) or sessions (token); every
//! directory and file carries its own access-control metadata which is
//! honored on every operation.

pub mod access;
pub mod auth;
pub mod drive;
pub mod error;
pub mod path;
pub mod server;
pub mod wire;

pub use error::{Error, Result};

/// Version string reported by the `info` command.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
