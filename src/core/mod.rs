//! # Wire Codec
//!
//! Fixed headers, opcode-specific payload layouts and stream framing.
//!
//! This module performs no I/O. It turns byte slices into typed requests and
//! responses and back, and splits an accumulating byte stream into frames.
//!
//! ## Components
//! - **Header**: fixed request (23 bytes) and response (7 bytes) headers
//! - **Request / Response**: one typed payload struct per opcode
//! - **Codec**: Tokio codecs for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! request:  [ClientId(16)] [Version(1)] [Code(2)] [PayloadSize(4)] [Payload(N)]
//! response: [Version(1)] [Code(2)] [PayloadSize(4)] [Payload(N)]
//! ```
//! All integers are little-endian.
//!
//! ## Limits
//! - Declared payload sizes above the configured maximum are rejected before
//!   any buffering (prevents memory exhaustion)

pub mod codec;
pub(crate) mod fields;
pub mod header;
pub mod request;
pub mod response;
