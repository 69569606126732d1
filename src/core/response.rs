//! Response codes and payload layouts.
//!
//! Every response type has one constructor taking its typed payload struct. The
//! ERROR response carries no payload and its encoding cannot fail; it is the
//! fallback whenever building any other response fails.

use bytes::BufMut;

use crate::core::fields::{self, FieldReader};
use crate::core::header::ResponseHeader;
use crate::error::ProtocolError;
use crate::model::{ClientId, MessageId, MessageType, PublicKey, CLIENT_ID_SIZE, PUBLIC_KEY_SIZE, USERNAME_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResponseCode {
    Registered = 2100,
    UserList = 2101,
    PublicKey = 2102,
    MessageSent = 2103,
    PolledMessages = 2104,
    Error = 9000,
}

impl ResponseCode {
    #[inline]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            ResponseCode::Registered => "REG_OK",
            ResponseCode::UserList => "LIST_USRS",
            ResponseCode::PublicKey => "PUB_KEY",
            ResponseCode::MessageSent => "MSG_SENT",
            ResponseCode::PolledMessages => "POLL_MSGS",
            ResponseCode::Error => "ERROR",
        }
    }
}

impl TryFrom<u16> for ResponseCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, ProtocolError> {
        match value {
            2100 => Ok(ResponseCode::Registered),
            2101 => Ok(ResponseCode::UserList),
            2102 => Ok(ResponseCode::PublicKey),
            2103 => Ok(ResponseCode::MessageSent),
            2104 => Ok(ResponseCode::PolledMessages),
            9000 => Ok(ResponseCode::Error),
            other => Err(ProtocolError::InvalidResponseCode(other)),
        }
    }
}

/// REG_OK payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationOk {
    pub client_id: ClientId,
}

/// One LIST_USRS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub client_id: ClientId,
    pub username: String,
}

impl UserEntry {
    pub const SIZE: usize = CLIENT_ID_SIZE + USERNAME_SIZE;
}

/// LIST_USRS payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserList {
    pub users: Vec<UserEntry>,
}

/// PUB_KEY payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyReply {
    pub client_id: ClientId,
    pub public_key: PublicKey,
}

impl PublicKeyReply {
    pub const SIZE: usize = CLIENT_ID_SIZE + PUBLIC_KEY_SIZE;
}

/// MSG_SENT payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSent {
    pub to_client: ClientId,
    pub message_id: MessageId,
}

impl MessageSent {
    pub const SIZE: usize = CLIENT_ID_SIZE + 4;
}

/// One POLL_MSGS record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledMessage {
    pub from_client: ClientId,
    pub message_id: MessageId,
    pub kind: MessageType,
    pub content: Vec<u8>,
}

impl PolledMessage {
    /// Fixed part of each record preceding the content
    pub const FIXED_SIZE: usize = CLIENT_ID_SIZE + 4 + 1 + 4;
}

/// POLL_MSGS payload
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolledMessages {
    pub messages: Vec<PolledMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Registered(RegistrationOk),
    UserList(UserList),
    PublicKey(PublicKeyReply),
    MessageSent(MessageSent),
    PolledMessages(PolledMessages),
    Error,
}

impl Response {
    pub fn registered(payload: RegistrationOk) -> Self {
        Response::Registered(payload)
    }

    pub fn user_list(payload: UserList) -> Self {
        Response::UserList(payload)
    }

    pub fn public_key(payload: PublicKeyReply) -> Self {
        Response::PublicKey(payload)
    }

    pub fn message_sent(payload: MessageSent) -> Self {
        Response::MessageSent(payload)
    }

    pub fn polled_messages(payload: PolledMessages) -> Self {
        Response::PolledMessages(payload)
    }

    pub fn error() -> Self {
        Response::Error
    }

    pub fn code(&self) -> ResponseCode {
        match self {
            Response::Registered(_) => ResponseCode::Registered,
            Response::UserList(_) => ResponseCode::UserList,
            Response::PublicKey(_) => ResponseCode::PublicKey,
            Response::MessageSent(_) => ResponseCode::MessageSent,
            Response::PolledMessages(_) => ResponseCode::PolledMessages,
            Response::Error => ResponseCode::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error)
    }

    pub fn payload_len(&self) -> usize {
        match self {
            Response::Registered(_) => CLIENT_ID_SIZE,
            Response::UserList(list) => list.users.len() * UserEntry::SIZE,
            Response::PublicKey(_) => PublicKeyReply::SIZE,
            Response::MessageSent(_) => MessageSent::SIZE,
            Response::PolledMessages(polled) => polled
                .messages
                .iter()
                .map(|m| PolledMessage::FIXED_SIZE + m.content.len())
                .sum(),
            Response::Error => 0,
        }
    }

    /// Check every field before anything is written, so a failed encode leaves `dst` untouched.
    fn validate(&self) -> Result<u32, ProtocolError> {
        match self {
            Response::UserList(list) => {
                for user in &list.users {
                    fields::check_padded(user.username.as_bytes(), USERNAME_SIZE, "username")?;
                }
            }
            Response::PolledMessages(polled) => {
                for message in &polled.messages {
                    fields::size_field(message.content.len())?;
                }
            }
            _ => {}
        }
        fields::size_field(self.payload_len())
    }

    pub fn encode<B: BufMut>(&self, version: u8, dst: &mut B) -> Result<(), ProtocolError> {
        let payload_size = self.validate()?;
        ResponseHeader {
            version,
            code: self.code().to_u16(),
            payload_size,
        }
        .write(dst);

        match self {
            Response::Registered(ok) => dst.put_slice(ok.client_id.as_bytes()),
            Response::UserList(list) => {
                for user in &list.users {
                    dst.put_slice(user.client_id.as_bytes());
                    fields::put_padded(dst, user.username.as_bytes(), USERNAME_SIZE);
                }
            }
            Response::PublicKey(reply) => {
                dst.put_slice(reply.client_id.as_bytes());
                dst.put_slice(reply.public_key.as_bytes());
            }
            Response::MessageSent(sent) => {
                dst.put_slice(sent.to_client.as_bytes());
                dst.put_u32_le(sent.message_id);
            }
            Response::PolledMessages(polled) => {
                for message in &polled.messages {
                    dst.put_slice(message.from_client.as_bytes());
                    dst.put_u32_le(message.message_id);
                    dst.put_u8(message.kind.to_u8());
                    dst.put_u32_le(message.content.len() as u32);
                    dst.put_slice(&message.content);
                }
            }
            Response::Error => {}
        }
        Ok(())
    }

    /// Write an ERROR response. Infallible.
    pub fn encode_error<B: BufMut>(version: u8, dst: &mut B) {
        ResponseHeader {
            version,
            code: ResponseCode::Error.to_u16(),
            payload_size: 0,
        }
        .write(dst);
    }

    pub fn to_bytes(&self, version: u8) -> Result<Vec<u8>, ProtocolError> {
        let mut out = Vec::with_capacity(ResponseHeader::SIZE + self.payload_len());
        self.encode(version, &mut out)?;
        Ok(out)
    }

    /// Decode one complete response frame.
    pub fn decode(frame: &[u8]) -> Result<(ResponseHeader, Self), ProtocolError> {
        let header = ResponseHeader::parse(frame)?;
        let code = ResponseCode::try_from(header.code)?;
        let payload = &frame[ResponseHeader::SIZE..];
        if payload.len() != header.payload_size as usize {
            return Err(ProtocolError::InvalidPayload(format!(
                "{} declares {} payload bytes but frame carries {}",
                code.name(),
                header.payload_size,
                payload.len()
            )));
        }

        let mut reader = FieldReader::new(payload, code.name());
        let response = match code {
            ResponseCode::Registered => Response::Registered(RegistrationOk {
                client_id: reader.client_id()?,
            }),
            ResponseCode::UserList => {
                if payload.len() % UserEntry::SIZE != 0 {
                    return Err(ProtocolError::InvalidPayload(format!(
                        "LIST_USRS payload of {} bytes is not a multiple of {}",
                        payload.len(),
                        UserEntry::SIZE
                    )));
                }
                let mut users = Vec::with_capacity(payload.len() / UserEntry::SIZE);
                while reader.remaining() > 0 {
                    let client_id = reader.client_id()?;
                    let username = reader.padded_text(USERNAME_SIZE)?;
                    users.push(UserEntry { client_id, username });
                }
                Response::UserList(UserList { users })
            }
            ResponseCode::PublicKey => {
                let client_id = reader.client_id()?;
                let public_key = PublicKey::from_slice(reader.padded(PUBLIC_KEY_SIZE)?)?;
                Response::PublicKey(PublicKeyReply {
                    client_id,
                    public_key,
                })
            }
            ResponseCode::MessageSent => Response::MessageSent(MessageSent {
                to_client: reader.client_id()?,
                message_id: reader.u32()?,
            }),
            ResponseCode::PolledMessages => {
                let mut messages = Vec::new();
                while reader.remaining() > 0 {
                    let from_client = reader.client_id()?;
                    let message_id = reader.u32()?;
                    let kind = reader.message_type()?;
                    let content_size = reader.u32()? as usize;
                    let content = reader.take(content_size)?.to_vec();
                    messages.push(PolledMessage {
                        from_client,
                        message_id,
                        kind,
                        content,
                    });
                }
                Response::PolledMessages(PolledMessages { messages })
            }
            ResponseCode::Error => Response::Error,
        };
        reader.finish()?;
        Ok((header, response))
    }
}
