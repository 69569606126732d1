//! Request opcodes and payload layouts.
//!
//! | code | layout |
//! |------|--------|
//! | 600 REGISTER     | `username(255, NUL-padded) public_key(160, NUL-padded)` |
//! | 601 LIST_USERS   | empty |
//! | 602 GET_PUB_KEY  | `client_id(16)` |
//! | 603 SEND_MSG     | `client_id(16) msg_type(1) content_size(4) content(N)` |
//! | 604 POLL_MSGS    | empty |

use bytes::BufMut;

use crate::config::PROTOCOL_VERSION;
use crate::core::fields::{self, FieldReader};
use crate::core::header::RequestHeader;
use crate::error::{constants, ProtocolError};
use crate::model::{ClientId, MessageType, PublicKey, CLIENT_ID_SIZE, PUBLIC_KEY_SIZE, USERNAME_SIZE};

/// Recognized request opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RequestCode {
    Register = 600,
    ListUsers = 601,
    GetPublicKey = 602,
    SendMessage = 603,
    PollMessages = 604,
}

impl RequestCode {
    pub const ALL: [RequestCode; 5] = [
        RequestCode::Register,
        RequestCode::ListUsers,
        RequestCode::GetPublicKey,
        RequestCode::SendMessage,
        RequestCode::PollMessages,
    ];

    #[inline]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            RequestCode::Register => "REGISTER",
            RequestCode::ListUsers => "LIST_USERS",
            RequestCode::GetPublicKey => "GET_PUB_KEY",
            RequestCode::SendMessage => "SEND_MSG",
            RequestCode::PollMessages => "POLL_MSGS",
        }
    }
}

impl TryFrom<u16> for RequestCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            600 => Ok(RequestCode::Register),
            601 => Ok(RequestCode::ListUsers),
            602 => Ok(RequestCode::GetPublicKey),
            603 => Ok(RequestCode::SendMessage),
            604 => Ok(RequestCode::PollMessages),
            other => Err(ProtocolError::InvalidRequestCode(other)),
        }
    }
}

/// REGISTER payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRequest {
    pub username: String,
    pub public_key: PublicKey,
}

/// GET_PUB_KEY payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeyRequest {
    pub client_id: ClientId,
}

/// SEND_MSG payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub to_client: ClientId,
    pub kind: MessageType,
    pub content: Vec<u8>,
}

impl SendMessageRequest {
    /// Fixed part of the layout preceding the content
    pub const FIXED_SIZE: usize = CLIENT_ID_SIZE + 1 + 4;
}

/// Decoded request payload, one variant per opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Register(RegisterRequest),
    ListUsers,
    GetPublicKey(PublicKeyRequest),
    SendMessage(SendMessageRequest),
    PollMessages,
}

impl RequestBody {
    /// Serialized REGISTER payload size (415 bytes)
    pub const REGISTER_SIZE: usize = USERNAME_SIZE + PUBLIC_KEY_SIZE;

    pub fn code(&self) -> RequestCode {
        match self {
            RequestBody::Register(_) => RequestCode::Register,
            RequestBody::ListUsers => RequestCode::ListUsers,
            RequestBody::GetPublicKey(_) => RequestCode::GetPublicKey,
            RequestBody::SendMessage(_) => RequestCode::SendMessage,
            RequestBody::PollMessages => RequestCode::PollMessages,
        }
    }

    pub fn payload_len(&self) -> usize {
        match self {
            RequestBody::Register(_) => Self::REGISTER_SIZE,
            RequestBody::ListUsers | RequestBody::PollMessages => 0,
            RequestBody::GetPublicKey(_) => CLIENT_ID_SIZE,
            RequestBody::SendMessage(send) => SendMessageRequest::FIXED_SIZE + send.content.len(),
        }
    }

    /// Decode `payload` with the layout registered for `code`.
    pub fn decode(code: RequestCode, payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = FieldReader::new(payload, code.name());
        let body = match code {
            RequestCode::Register => {
                expect_len(code, payload, Self::REGISTER_SIZE)?;
                let username = reader.padded_text(USERNAME_SIZE)?;
                if username.is_empty() {
                    return Err(ProtocolError::InvalidPayload(
                        constants::ERR_EMPTY_USERNAME.to_string(),
                    ));
                }
                let public_key = PublicKey::from_slice(reader.padded(PUBLIC_KEY_SIZE)?)?;
                RequestBody::Register(RegisterRequest {
                    username,
                    public_key,
                })
            }
            RequestCode::ListUsers => {
                expect_len(code, payload, 0)?;
                RequestBody::ListUsers
            }
            RequestCode::GetPublicKey => {
                expect_len(code, payload, CLIENT_ID_SIZE)?;
                RequestBody::GetPublicKey(PublicKeyRequest {
                    client_id: reader.client_id()?,
                })
            }
            RequestCode::SendMessage => {
                let to_client = reader.client_id()?;
                let kind = reader.message_type()?;
                let content_size = reader.u32()? as usize;
                if content_size != reader.remaining() {
                    return Err(ProtocolError::InvalidPayload(format!(
                        "SEND_MSG declares {content_size} content bytes but carries {}",
                        reader.remaining()
                    )));
                }
                let content = reader.take(content_size)?.to_vec();
                RequestBody::SendMessage(SendMessageRequest {
                    to_client,
                    kind,
                    content,
                })
            }
            RequestCode::PollMessages => {
                expect_len(code, payload, 0)?;
                RequestBody::PollMessages
            }
        };
        reader.finish()?;
        Ok(body)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            RequestBody::Register(register) => {
                fields::check_padded(register.username.as_bytes(), USERNAME_SIZE, "username")
            }
            RequestBody::SendMessage(send) => fields::size_field(send.content.len()).map(|_| ()),
            _ => Ok(()),
        }
    }

    fn write_payload<B: BufMut>(&self, dst: &mut B) {
        match self {
            RequestBody::Register(register) => {
                fields::put_padded(dst, register.username.as_bytes(), USERNAME_SIZE);
                dst.put_slice(register.public_key.as_bytes());
            }
            RequestBody::ListUsers | RequestBody::PollMessages => {}
            RequestBody::GetPublicKey(lookup) => dst.put_slice(lookup.client_id.as_bytes()),
            RequestBody::SendMessage(send) => {
                dst.put_slice(send.to_client.as_bytes());
                dst.put_u8(send.kind.to_u8());
                dst.put_u32_le(send.content.len() as u32);
                dst.put_slice(&send.content);
            }
        }
    }
}

fn expect_len(code: RequestCode, payload: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(ProtocolError::InvalidPayload(format!(
            "{} payload must be {expected} bytes, got {}",
            code.name(),
            payload.len()
        )))
    }
}

/// A fully decoded request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub header: RequestHeader,
    pub body: RequestBody,
}

impl Request {
    /// Build a request at the current protocol version with a consistent header.
    pub fn new(client_id: ClientId, body: RequestBody) -> Self {
        let header = RequestHeader {
            client_id,
            version: PROTOCOL_VERSION,
            code: body.code().to_u16(),
            payload_size: body.payload_len() as u32,
        };
        Self { header, body }
    }

    /// Decode one complete frame: header, opcode, then exactly `payload_size` bytes.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let header = RequestHeader::parse(frame)?;
        let code = RequestCode::try_from(header.code)?;

        let payload = &frame[RequestHeader::SIZE..];
        let declared = header.payload_size as usize;
        if payload.len() != declared {
            return Err(ProtocolError::InvalidPayload(format!(
                "{} declares {declared} payload bytes but frame carries {}",
                code.name(),
                payload.len()
            )));
        }

        let body = RequestBody::decode(code, payload)?;
        Ok(Self { header, body })
    }

    pub fn encode<B: BufMut>(&self, dst: &mut B) -> Result<(), ProtocolError> {
        self.body.validate()?;
        let mut header = self.header;
        header.code = self.body.code().to_u16();
        header.payload_size = fields::size_field(self.body.payload_len())?;
        header.write(dst);
        self.body.write_payload(dst);
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(RequestHeader::SIZE + self.body.payload_len());
        self.encode(&mut out)?;
        Ok(out)
    }
}
