//! Socket plumbing
//!
//! Pages (through the browser shim) reach the daemon over a Unix domain
//! socket speaking newline-delimited JSON; the daemon reaches the device
//! helper the same way.

mod client;
mod server;
mod types;

// Public API
pub use client::{SocketHelper, SocketHelperFactory};
pub use server::{handle_connection, IpcServer};
pub use types::PageMessage;
