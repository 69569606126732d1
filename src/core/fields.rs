//! Fixed-width field helpers shared by request and response layouts.
//!
//! All integers are little-endian. Text and key fields are NUL-padded to their
//! declared width on write and have trailing NULs stripped on read.

use bytes::BufMut;

use crate::error::{constants, ProtocolError};
use crate::model::{ClientId, MessageType, CLIENT_ID_SIZE};

/// Bounds-checked cursor over a payload slice.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    // Layout name used in error messages
    layout: &'static str,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8], layout: &'static str) -> Self {
        Self { buf, layout }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.buf.len() < len {
            return Err(ProtocolError::InvalidPayload(format!(
                "{} payload short: need {len} more bytes, have {}",
                self.layout,
                self.buf.len()
            )));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u32(&mut self) -> Result<u32, ProtocolError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn client_id(&mut self) -> Result<ClientId, ProtocolError> {
        let bytes = self.take(CLIENT_ID_SIZE)?;
        ClientId::from_slice(bytes).ok_or_else(|| {
            ProtocolError::InvalidPayload(format!("{} client id malformed", self.layout))
        })
    }

    pub(crate) fn message_type(&mut self) -> Result<MessageType, ProtocolError> {
        MessageType::try_from(self.u8()?)
    }

    /// Read a NUL-padded field and strip its trailing NULs.
    pub(crate) fn padded(&mut self, width: usize) -> Result<&'a [u8], ProtocolError> {
        Ok(strip_trailing_nul(self.take(width)?))
    }

    /// Read a NUL-padded UTF-8 text field.
    pub(crate) fn padded_text(&mut self, width: usize) -> Result<String, ProtocolError> {
        let raw = self.padded(width)?;
        String::from_utf8(raw.to_vec()).map_err(|_| {
            ProtocolError::InvalidPayload(constants::ERR_USERNAME_NOT_UTF8.to_string())
        })
    }

    /// Succeeds only if every byte has been consumed.
    pub(crate) fn finish(self) -> Result<(), ProtocolError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::InvalidPayload(format!(
                "{}: {} {}",
                self.layout,
                constants::ERR_TRAILING_BYTES,
                self.buf.len()
            )))
        }
    }
}

pub(crate) fn strip_trailing_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &field[..end]
}

/// Check that `value` fits into a `width`-byte padded field.
pub(crate) fn check_padded(
    value: &[u8],
    width: usize,
    field: &'static str,
) -> Result<(), ProtocolError> {
    if value.len() > width {
        Err(ProtocolError::InvalidPayload(format!(
            "{field} is {} bytes (maximum {width})",
            value.len()
        )))
    } else {
        Ok(())
    }
}

/// Write `value` followed by NUL padding up to `width`. Callers check the width first.
pub(crate) fn put_padded<B: BufMut>(dst: &mut B, value: &[u8], width: usize) {
    let len = value.len().min(width);
    dst.put_slice(&value[..len]);
    dst.put_bytes(0, width - len);
}

/// Convert a payload length to the 32-bit size field.
pub(crate) fn size_field(len: usize) -> Result<u32, ProtocolError> {
    u32::try_from(len).map_err(|_| ProtocolError::OversizedPayload(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_trailing_nul() {
        assert_eq!(strip_trailing_nul(b"alice\0\0\0"), b"alice");
        assert_eq!(strip_trailing_nul(b"a\0b\0"), b"a\0b");
        assert_eq!(strip_trailing_nul(b"\0\0"), b"");
        assert_eq!(strip_trailing_nul(b"full"), b"full");
    }

    #[test]
    fn test_reader_reports_short_payload() {
        let mut reader = FieldReader::new(&[1, 2, 3], "TEST");
        assert!(reader.u32().is_err());
    }

    #[test]
    fn test_reader_little_endian() {
        let mut reader = FieldReader::new(&[0x01, 0x02, 0x03, 0x04], "TEST");
        assert_eq!(reader.u32().unwrap(), 0x0403_0201);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_finish_rejects_leftovers() {
        let mut reader = FieldReader::new(&[9, 9], "TEST");
        reader.u8().unwrap();
        assert_eq!(reader.remaining(), 1);
        assert!(matches!(
            reader.finish(),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_put_padded() {
        let mut out = Vec::new();
        put_padded(&mut out, b"bob", 6);
        assert_eq!(out, b"bob\0\0\0");
    }
}
