//! Property-based tests using proptest
//!
//! Requests and responses built from arbitrary field values must decode back to
//! the same value, and framing must not depend on how the stream is split.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use mailbox_server::core::codec::{RequestCodec, ResponseCodec};
use mailbox_server::core::request::{
    PublicKeyRequest, RegisterRequest, Request, RequestBody, SendMessageRequest,
};
use mailbox_server::core::response::{
    MessageSent, PolledMessage, PolledMessages, Response, UserEntry, UserList,
};
use mailbox_server::model::{ClientId, MessageType, PublicKey};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

fn client_id() -> impl Strategy<Value = ClientId> {
    any::<[u8; 16]>().prop_map(ClientId::from_bytes)
}

fn public_key() -> impl Strategy<Value = PublicKey> {
    prop::collection::vec(any::<u8>(), 160)
        .prop_map(|bytes| PublicKey::from_slice(&bytes).expect("160 bytes fit"))
}

fn username() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}"
}

fn message_type() -> impl Strategy<Value = MessageType> {
    prop::sample::select(MessageType::ALL.to_vec())
}

fn content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

fn request_body() -> impl Strategy<Value = RequestBody> {
    prop_oneof![
        (username(), public_key()).prop_map(|(username, public_key)| {
            RequestBody::Register(RegisterRequest {
                username,
                public_key,
            })
        }),
        Just(RequestBody::ListUsers),
        client_id().prop_map(|client_id| RequestBody::GetPublicKey(PublicKeyRequest { client_id })),
        (client_id(), message_type(), content()).prop_map(|(to_client, kind, content)| {
            RequestBody::SendMessage(SendMessageRequest {
                to_client,
                kind,
                content,
            })
        }),
        Just(RequestBody::PollMessages),
    ]
}

fn polled_message() -> impl Strategy<Value = PolledMessage> {
    (client_id(), any::<u32>(), message_type(), content()).prop_map(
        |(from_client, message_id, kind, content)| PolledMessage {
            from_client,
            message_id,
            kind,
            content,
        },
    )
}

// Property: every well-formed request decodes to itself
proptest! {
    #[test]
    fn prop_request_roundtrip(sender in client_id(), body in request_body()) {
        let request = Request::new(sender, body);
        let bytes = request.to_bytes().unwrap();

        prop_assert_eq!(Request::decode(&bytes).unwrap(), request);
    }
}

// Property: the declared payload size always matches the bytes written
proptest! {
    #[test]
    fn prop_request_size_consistent(sender in client_id(), body in request_body()) {
        let expected = body.payload_len();
        let bytes = Request::new(sender, body).to_bytes().unwrap();

        prop_assert_eq!(bytes.len(), 23 + expected);
        let declared = u32::from_le_bytes([bytes[19], bytes[20], bytes[21], bytes[22]]);
        prop_assert_eq!(declared as usize, expected);
    }
}

// Property: user lists keep their order and contents
proptest! {
    #[test]
    fn prop_user_list_roundtrip(users in prop::collection::vec((client_id(), username()), 0..32)) {
        let response = Response::user_list(UserList {
            users: users
                .into_iter()
                .map(|(client_id, username)| UserEntry { client_id, username })
                .collect(),
        });
        let bytes = response.to_bytes(1).unwrap();
        let (header, decoded) = Response::decode(&bytes).unwrap();

        prop_assert_eq!(header.version, 1);
        prop_assert_eq!(decoded, response);
    }
}

// Property: polled messages keep their order and contents
proptest! {
    #[test]
    fn prop_polled_messages_roundtrip(messages in prop::collection::vec(polled_message(), 0..16)) {
        let response = Response::polled_messages(PolledMessages { messages });
        let bytes = response.to_bytes(1).unwrap();

        prop_assert_eq!(Response::decode(&bytes).unwrap().1, response);
    }
}

// Property: arbitrary bytes never panic the request decoder
proptest! {
    #[test]
    fn prop_request_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = Request::decode(&bytes);
    }
}

// Property: framing is independent of where the stream is split
proptest! {
    #[test]
    fn prop_split_point_irrelevant(
        bodies in prop::collection::vec(request_body(), 1..8),
        splits in prop::collection::vec(any::<prop::sample::Index>(), 0..8),
    ) {
        let frames: Vec<Vec<u8>> = bodies
            .into_iter()
            .map(|body| Request::new(ClientId::default(), body).to_bytes().unwrap())
            .collect();
        let stream = frames.concat();

        let mut cuts: Vec<usize> = splits.iter().map(|i| i.index(stream.len())).collect();
        cuts.push(stream.len());
        cuts.sort_unstable();

        let mut codec = RequestCodec::default();
        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();
        let mut at = 0;
        for cut in cuts {
            buffer.extend_from_slice(&stream[at..cut]);
            at = cut;
            while let Some(frame) = codec.decode(&mut buffer).unwrap() {
                decoded.push(frame.to_vec());
            }
        }

        prop_assert!(buffer.is_empty());
        prop_assert_eq!(decoded, frames);
    }
}

// Property: a response encoded by the server codec decodes in the client codec
proptest! {
    #[test]
    fn prop_response_codecs_agree(to_client in client_id(), message_id in any::<u32>()) {
        let response = Response::message_sent(MessageSent { to_client, message_id });

        let mut buffer = BytesMut::new();
        RequestCodec::default().encode(response.clone(), &mut buffer).unwrap();
        let decoded = ResponseCodec::default().decode(&mut buffer).unwrap();

        prop_assert_eq!(decoded, Some(response));
        prop_assert!(buffer.is_empty());
    }
}
