//! # Request Dispatch
//!
//! Turns one complete request frame into exactly one response plus a
//! connection disposition. Nothing in here fails outward: decode errors,
//! domain rule violations and store failures all become an ERROR response.
//!
//! ## Disposition
//! - Malformed frames always close the connection
//! - Domain and store failures close it unless `close_on_error` is off
//! - Successful requests keep it open

pub mod dispatcher;

pub use dispatcher::{Dispatched, Dispatcher, Disposition, RequestContext};
