#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Boundary conditions of the wire format and the mailbox rules

use std::sync::Arc;

use bytes::BytesMut;
use mailbox_server::core::codec::RequestCodec;
use mailbox_server::core::header::{RequestHeader, ResponseHeader};
use mailbox_server::core::request::{RegisterRequest, Request, RequestBody, SendMessageRequest};
use mailbox_server::core::response::{PolledMessage, PolledMessages, Response, UserEntry, UserList};
use mailbox_server::error::ProtocolError;
use mailbox_server::model::{ClientId, MessageType, PublicKey, USERNAME_SIZE};
use mailbox_server::protocol::{Dispatcher, Disposition};
use mailbox_server::store::MemoryStore;
use tokio_util::codec::Decoder;

fn register_payload(username: &[u8], key: &[u8]) -> Vec<u8> {
    let mut payload = vec![0u8; RequestBody::REGISTER_SIZE];
    payload[..username.len()].copy_from_slice(username);
    payload[USERNAME_SIZE..USERNAME_SIZE + key.len()].copy_from_slice(key);
    payload
}

fn raw_frame(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    RequestHeader {
        client_id: ClientId::default(),
        version: 1,
        code,
        payload_size: payload.len() as u32,
    }
    .write(&mut out);
    out.extend_from_slice(payload);
    out
}

// ============================================================================
// REQUEST LAYOUT EDGE CASES
// ============================================================================

#[test]
fn test_full_width_username_without_nul() {
    let username = vec![b'u'; USERNAME_SIZE];
    let frame = raw_frame(600, &register_payload(&username, b"k"));

    match Request::decode(&frame).unwrap().body {
        RequestBody::Register(register) => {
            assert_eq!(register.username.len(), USERNAME_SIZE);
            assert_eq!(register.username.as_bytes(), username.as_slice());
        }
        other => panic!("Expected REGISTER, got {other:?}"),
    }
}

#[test]
fn test_full_width_public_key() {
    let key = [0xFFu8; 160];
    let frame = raw_frame(600, &register_payload(b"k", &key));

    match Request::decode(&frame).unwrap().body {
        RequestBody::Register(register) => assert_eq!(register.public_key.as_bytes(), &key),
        other => panic!("Expected REGISTER, got {other:?}"),
    }
}

#[test]
fn test_empty_username_rejected() {
    let frame = raw_frame(600, &register_payload(b"", b"key"));
    assert!(matches!(
        Request::decode(&frame),
        Err(ProtocolError::InvalidPayload(_))
    ));
}

#[test]
fn test_non_utf8_username_rejected() {
    let frame = raw_frame(600, &register_payload(&[0xC3, 0x28], b"key"));
    assert!(matches!(
        Request::decode(&frame),
        Err(ProtocolError::InvalidPayload(_))
    ));
}

#[test]
fn test_register_wrong_size() {
    let mut payload = register_payload(b"alice", b"key");
    payload.pop();
    assert!(matches!(
        Request::decode(&raw_frame(600, &payload)),
        Err(ProtocolError::InvalidPayload(_))
    ));
}

#[test]
fn test_get_public_key_short_payload() {
    assert!(matches!(
        Request::decode(&raw_frame(602, &[1; 15])),
        Err(ProtocolError::InvalidPayload(_))
    ));
}

#[test]
fn test_every_message_type_accepted() {
    for kind in MessageType::ALL {
        let request = Request::new(
            ClientId::default(),
            RequestBody::SendMessage(SendMessageRequest {
                to_client: ClientId::from_bytes([1; 16]),
                kind,
                content: vec![kind.to_u8()],
            }),
        );
        assert_eq!(Request::decode(&request.to_bytes().unwrap()).unwrap(), request);
    }

    for bad in [0u8, 5, 255] {
        let mut payload = vec![0u8; 16];
        payload.push(bad);
        payload.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            Request::decode(&raw_frame(603, &payload)).unwrap_err(),
            ProtocolError::InvalidMessageType(bad)
        );
    }
}

// ============================================================================
// FRAMING EDGE CASES
// ============================================================================

#[test]
fn test_declared_payload_not_yet_arrived_stalls() {
    let mut codec = RequestCodec::default();
    let full = raw_frame(602, &[7; 16]);

    let mut buffer = BytesMut::from(&full[..full.len() - 1]);
    for _ in 0..3 {
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }
    assert_eq!(buffer.len(), full.len() - 1);

    buffer.extend_from_slice(&full[full.len() - 1..]);
    assert_eq!(codec.decode(&mut buffer).unwrap().unwrap().as_ref(), full.as_slice());
}

#[test]
fn test_payload_at_limit_is_framed() {
    let limit = 64;
    let mut codec = RequestCodec::new(limit);

    let mut content = vec![0u8; 16];
    content.push(MessageType::Text.to_u8());
    let body_len = limit - SendMessageRequest::FIXED_SIZE;
    content.extend_from_slice(&(body_len as u32).to_le_bytes());
    content.extend(std::iter::repeat(1u8).take(body_len));

    let frame = raw_frame(603, &content);
    let mut buffer = BytesMut::from(&frame[..]);
    assert!(codec.decode(&mut buffer).unwrap().is_some());

    content.push(0);
    let mut buffer = BytesMut::from(&raw_frame(603, &content)[..]);
    assert!(codec.decode(&mut buffer).is_err());
}

// ============================================================================
// RESPONSE EDGE CASES
// ============================================================================

#[test]
fn test_empty_collections_encode_header_only() {
    for response in [
        Response::user_list(UserList::default()),
        Response::polled_messages(PolledMessages::default()),
        Response::error(),
    ] {
        let bytes = response.to_bytes(1).unwrap();
        assert_eq!(bytes.len(), ResponseHeader::SIZE);
        assert_eq!(Response::decode(&bytes).unwrap().1, response);
    }
}

#[test]
fn test_polled_records_are_contiguous() {
    let polled = Response::polled_messages(PolledMessages {
        messages: vec![
            PolledMessage {
                from_client: ClientId::from_bytes([1; 16]),
                message_id: 1,
                kind: MessageType::Text,
                content: b"abc".to_vec(),
            },
            PolledMessage {
                from_client: ClientId::from_bytes([2; 16]),
                message_id: 2,
                kind: MessageType::SymmetricKeyDelivery,
                content: Vec::new(),
            },
        ],
    });

    let bytes = polled.to_bytes(1).unwrap();
    assert_eq!(
        bytes.len(),
        ResponseHeader::SIZE + 2 * PolledMessage::FIXED_SIZE + 3
    );
    // Second record starts right after the first one's content
    let second = ResponseHeader::SIZE + PolledMessage::FIXED_SIZE + 3;
    assert_eq!(&bytes[second..second + 16], &[2u8; 16]);
}

#[test]
fn test_user_entry_padding() {
    let list = Response::user_list(UserList {
        users: vec![UserEntry {
            client_id: ClientId::from_bytes([5; 16]),
            username: "zed".into(),
        }],
    });
    let bytes = list.to_bytes(1).unwrap();
    assert_eq!(bytes.len(), ResponseHeader::SIZE + UserEntry::SIZE);
    let name = &bytes[ResponseHeader::SIZE + 16..];
    assert_eq!(&name[..3], b"zed");
    assert!(name[3..].iter().all(|&b| b == 0));
}

// ============================================================================
// DISPATCH EDGE CASES
// ============================================================================

#[test]
fn test_truncated_frame_to_dispatcher() {
    let dispatcher = Dispatcher::new(Arc::new(MemoryStore::new()));
    let dispatched = dispatcher.dispatch(&[0u8; 5]);
    assert_eq!(dispatched.response, Response::Error);
    assert_eq!(dispatched.disposition, Disposition::Close);
}

#[test]
fn test_unregistered_sender_may_send() {
    let dispatcher = Dispatcher::new(Arc::new(MemoryStore::new()));
    let register = Request::new(
        ClientId::default(),
        RequestBody::Register(RegisterRequest {
            username: "bob".into(),
            public_key: PublicKey::from_bytes([1; 160]),
        }),
    );
    let bob = match dispatcher.dispatch(&register.to_bytes().unwrap()).response {
        Response::Registered(ok) => ok.client_id,
        other => panic!("Expected REG_OK, got {other:?}"),
    };

    let stranger = ClientId::from_bytes([0x55; 16]);
    let send = Request::new(
        stranger,
        RequestBody::SendMessage(SendMessageRequest {
            to_client: bob,
            kind: MessageType::Text,
            content: b"hello".to_vec(),
        }),
    );
    let sent = dispatcher.dispatch(&send.to_bytes().unwrap());
    assert!(matches!(sent.response, Response::MessageSent(_)));
    assert_eq!(sent.disposition, Disposition::KeepOpen);
}
