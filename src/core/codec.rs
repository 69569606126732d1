//! Stream framing on top of the fixed headers.
//!
//! [`RequestCodec`] is the server side: it accumulates bytes, and each call to
//! `decode` splits off at most one complete frame, leaving any remainder
//! buffered for the next call. A frame whose declared payload has not fully
//! arrived yields `None` rather than an error.
//!
//! [`ResponseCodec`] is the mirror image used by clients and tests.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::config::{MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::core::header::{RequestHeader, ResponseHeader};
use crate::core::request::Request;
use crate::core::response::Response;
use crate::error::{ProtocolError, ServerError};

/// Server-side codec: raw request frames in, responses out.
#[derive(Debug, Clone, Copy)]
pub struct RequestCodec {
    max_payload_size: usize,
    version: u8,
}

impl Default for RequestCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl RequestCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            max_payload_size,
            version: PROTOCOL_VERSION,
        }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }
}

impl Decoder for RequestCodec {
    /// One complete frame, header included
    type Item = Bytes;
    type Error = ServerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ServerError> {
        let Some(payload_size) = RequestHeader::peek_payload_size(src) else {
            return Ok(None);
        };

        let payload_size = payload_size as usize;
        if payload_size > self.max_payload_size {
            return Err(ProtocolError::OversizedPayload(payload_size).into());
        }

        let frame_len = RequestHeader::SIZE + payload_size;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            trace!(buffered = src.len(), frame_len, "Partial frame buffered");
            return Ok(None);
        }

        Ok(Some(src.split_to(frame_len).freeze()))
    }
}

impl Encoder<Response> for RequestCodec {
    type Error = ServerError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), ServerError> {
        dst.reserve(ResponseHeader::SIZE + item.payload_len());
        item.encode(self.version, dst)?;
        Ok(())
    }
}

/// Client-side codec: responses in, requests out.
#[derive(Debug, Clone, Copy)]
pub struct ResponseCodec {
    max_payload_size: usize,
}

impl Default for ResponseCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl ResponseCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }
}

impl Decoder for ResponseCodec {
    type Item = Response;
    type Error = ServerError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, ServerError> {
        let Some(payload_size) = ResponseHeader::peek_payload_size(src) else {
            return Ok(None);
        };

        let payload_size = payload_size as usize;
        if payload_size > self.max_payload_size {
            return Err(ProtocolError::OversizedPayload(payload_size).into());
        }

        let frame_len = ResponseHeader::SIZE + payload_size;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        let (_, response) = Response::decode(&frame)?;
        Ok(Some(response))
    }
}

impl Encoder<Request> for ResponseCodec {
    type Error = ServerError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), ServerError> {
        dst.reserve(RequestHeader::SIZE + item.body.payload_len());
        item.encode(dst)?;
        Ok(())
    }
}
