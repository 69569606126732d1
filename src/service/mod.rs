//! # Domain Services
//!
//! Business rules over the mailbox store.
//!
//! - [`ClientService`]: registration with unique usernames and fresh ids,
//!   lookup, listing and `last_seen` refresh
//! - [`MessageService`]: queueing for known recipients and destructive polling
//!
//! Services return [`DomainError`](crate::error::DomainError) for rule
//! violations and pass store failures through unchanged.

pub mod client;
pub mod message;

pub use client::ClientService;
pub use message::MessageService;
