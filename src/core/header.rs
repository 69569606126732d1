//! Fixed request and response headers.
//!
//! ```text
//! request:  [client_id(16)] [version(1)] [code(2)] [payload_size(4)]
//! response: [version(1)] [code(2)] [payload_size(4)]
//! ```
//!
//! The code is kept as a raw `u16` here; mapping it to a known request or
//! response kind is the job of the payload layer.

use bytes::BufMut;

use crate::error::ProtocolError;
use crate::model::{ClientId, CLIENT_ID_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub client_id: ClientId,
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl RequestHeader {
    /// Serialized header size (23 bytes)
    pub const SIZE: usize = CLIENT_ID_SIZE + 1 + 2 + 4;

    /// Offset of the `payload_size` field within the header
    const PAYLOAD_SIZE_OFFSET: usize = CLIENT_ID_SIZE + 1 + 2;

    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::Truncated {
                needed: Self::SIZE,
                available: buf.len(),
            });
        }
        let mut id = [0u8; CLIENT_ID_SIZE];
        id.copy_from_slice(&buf[..CLIENT_ID_SIZE]);
        let version = buf[CLIENT_ID_SIZE];
        let code = u16::from_le_bytes([buf[CLIENT_ID_SIZE + 1], buf[CLIENT_ID_SIZE + 2]]);
        let payload_size = Self::read_payload_size(buf);

        Ok(Self {
            client_id: ClientId::from_bytes(id),
            version,
            code,
            payload_size,
        })
    }

    /// Read `payload_size` without parsing the rest; `None` until a whole header is buffered.
    #[inline]
    pub fn peek_payload_size(buf: &[u8]) -> Option<u32> {
        (buf.len() >= Self::SIZE).then(|| Self::read_payload_size(buf))
    }

    #[inline]
    fn read_payload_size(buf: &[u8]) -> u32 {
        let at = Self::PAYLOAD_SIZE_OFFSET;
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    pub fn write<B: BufMut>(&self, dst: &mut B) {
        dst.put_slice(self.client_id.as_bytes());
        dst.put_u8(self.version);
        dst.put_u16_le(self.code);
        dst.put_u32_le(self.payload_size);
    }

    /// Total length of the frame this header introduces.
    #[inline]
    pub fn frame_len(&self) -> usize {
        Self::SIZE + self.payload_size as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub version: u8,
    pub code: u16,
    pub payload_size: u32,
}

impl ResponseHeader {
    /// Serialized header size (7 bytes)
    pub const SIZE: usize = 1 + 2 + 4;

    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::Truncated {
                needed: Self::SIZE,
                available: buf.len(),
            });
        }
        Ok(Self {
            version: buf[0],
            code: u16::from_le_bytes([buf[1], buf[2]]),
            payload_size: Self::read_payload_size(buf),
        })
    }

    #[inline]
    pub fn peek_payload_size(buf: &[u8]) -> Option<u32> {
        (buf.len() >= Self::SIZE).then(|| Self::read_payload_size(buf))
    }

    #[inline]
    fn read_payload_size(buf: &[u8]) -> u32 {
        u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]])
    }

    pub fn write<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.version);
        dst.put_u16_le(self.code);
        dst.put_u32_le(self.payload_size);
    }

    #[inline]
    pub fn frame_len(&self) -> usize {
        Self::SIZE + self.payload_size as usize
    }
}
