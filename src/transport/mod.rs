//! # Transport Layer
//!
//! TCP accept loop and per-connection tasks.
//!
//! Connections run as tasks on whichever runtime drives the [`Server`]; the
//! binary uses a single-threaded runtime, so all connections share one thread
//! and only yield at socket readiness. Request handling itself never awaits.
//!
//! ## Shutdown
//! - CTRL+C ([`Server::run`]) or an explicit channel ([`Server::run_with_shutdown`])
//! - The listener closes first, then open connections are aborted

pub mod connection;
pub mod server;

pub use connection::{Connection, ConnectionState};
pub use server::Server;
