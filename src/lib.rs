//! # Mailbox Server
//!
//! A store-and-forward messaging server. Clients register a username and
//! public key, discover each other and exchange opaque messages that wait in
//! a server-side mailbox until the recipient polls for them.
//!
//! ## Layers
//! - [`core`]: fixed-layout binary codec and stream framing (no I/O)
//! - [`store`]: client and message persistence, in memory or SQLite
//! - [`service`]: registration, lookup, send and poll rules
//! - [`protocol`]: opcode dispatch and error-to-response conversion
//! - [`transport`]: TCP listener and per-connection tasks
//!
//! ## Guarantees
//! - Usernames and client ids are unique
//! - A queued message is delivered at most once, to its recipient only
//! - Every complete request frame gets exactly one response
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use mailbox_server::core::request::{Request, RequestBody, RegisterRequest};
//! use mailbox_server::core::response::Response;
//! use mailbox_server::model::{ClientId, PublicKey};
//! use mailbox_server::protocol::Dispatcher;
//! use mailbox_server::store::MemoryStore;
//!
//! let dispatcher = Dispatcher::new(Arc::new(MemoryStore::new()));
//! let frame = Request::new(
//!     ClientId::default(),
//!     RequestBody::Register(RegisterRequest {
//!         username: "alice".into(),
//!         public_key: PublicKey::from_bytes([0u8; 160]),
//!     }),
//! )
//! .to_bytes()
//! .unwrap();
//!
//! let dispatched = dispatcher.dispatch(&frame);
//! assert!(matches!(dispatched.response, Response::Registered(_)));
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod model;
pub mod protocol;
pub mod service;
pub mod store;
pub mod transport;
pub mod utils;

pub use config::Config;
pub use error::{Result, ServerError};
pub use protocol::Dispatcher;
pub use transport::Server;
