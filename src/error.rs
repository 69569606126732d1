//! # Error Types
//!
//! Error handling for the mailbox server.
//!
//! Failures are split along the boundary where they are detected, because the
//! boundary decides what happens to the connection that triggered them.
//!
//! ## Error Categories
//! - **Protocol Errors**: bad opcode, malformed or short payload, wrong payload size,
//!   unknown message type, oversized frame. Always answered with ERROR and the
//!   connection is closed.
//! - **Domain Errors**: duplicate username, unknown client. Answered with ERROR.
//! - **Store Errors**: backend failures. Answered like domain errors but logged at
//!   `error` severity.
//! - **Transport Errors**: socket I/O failures. The connection is dropped silently.
//!
//! ## Example Usage
//! ```rust
//! use mailbox_server::error::{DomainError, ErrorClass, ServerError};
//!
//! let err: ServerError = DomainError::NotFound("client 00ff".into()).into();
//! assert_eq!(err.class(), ErrorClass::Domain);
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Store errors
    pub const ERR_LOCK_POISONED: &str = "Store lock poisoned";
    pub const ERR_SEQUENCE_EXHAUSTED: &str = "Message id sequence exhausted";

    /// Payload validation errors
    pub const ERR_EMPTY_USERNAME: &str = "Username is empty";
    pub const ERR_USERNAME_NOT_UTF8: &str = "Username is not valid UTF-8";
    pub const ERR_TRAILING_BYTES: &str = "Payload has trailing bytes";

    /// Configuration errors
    pub const ERR_SUBSCRIBER_INSTALLED: &str = "Failed to install tracing subscriber";
}

/// Wire-level failures detected while framing or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid request code: {0}")]
    InvalidRequestCode(u16),

    #[error("Invalid response code: {0}")]
    InvalidResponseCode(u16),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Payload too large: {0} bytes")]
    OversizedPayload(usize),

    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Business-rule failures raised by the services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Username already registered: {0}")]
    DuplicateUsername(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Persistence backend failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Unique constraint violated on {entity}.{field}")]
    Conflict {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("{}", constants::ERR_SEQUENCE_EXHAUSTED)]
    SequenceExhausted,

    #[error("{}", constants::ERR_LOCK_POISONED)]
    LockPoisoned,
}

// ServerError is the umbrella type returned across module boundaries
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used for connection disposition and log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Protocol,
    Domain,
    Store,
    Transport,
    Config,
}

impl ServerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServerError::Protocol(_) => ErrorClass::Protocol,
            ServerError::Domain(_) => ErrorClass::Domain,
            ServerError::Store(_) => ErrorClass::Store,
            ServerError::Io(_) => ErrorClass::Transport,
            ServerError::Config(_) => ErrorClass::Config,
        }
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(err: rusqlite::Error) -> Self {
        ServerError::Store(StoreError::Sqlite(err))
    }
}

/// Type alias for Results using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

/// Type alias for store-level Results
pub type StoreResult<T> = std::result::Result<T, StoreError>;
