use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use mailbox_server::core::codec::RequestCodec;
use mailbox_server::core::request::{Request, RequestBody, SendMessageRequest};
use mailbox_server::core::response::{PolledMessage, PolledMessages, Response};
use mailbox_server::model::{ClientId, MessageType};
use tokio_util::codec::{Decoder, Encoder};

fn send_frame(size: usize) -> Vec<u8> {
    Request::new(
        ClientId::from_bytes([1; 16]),
        RequestBody::SendMessage(SendMessageRequest {
            to_client: ClientId::from_bytes([2; 16]),
            kind: MessageType::File,
            content: vec![0xAB; size],
        }),
    )
    .to_bytes()
    .unwrap_or_default()
}

#[allow(clippy::unwrap_used)]
fn bench_request_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_msg_decode");
    let content_sizes = [64usize, 512, 4096, 65536, 1024 * 1024];

    for &size in &content_sizes {
        let frame = send_frame(size);
        group.throughput(Throughput::Bytes(frame.len() as u64));

        group.bench_function(format!("frame_{size}b"), |b| {
            b.iter_batched(
                || BytesMut::from(&frame[..]),
                |mut buf| {
                    let mut codec = RequestCodec::default();
                    codec.decode(&mut buf).unwrap().unwrap()
                },
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("parse_{size}b"), |b| {
            b.iter(|| Request::decode(&frame).unwrap())
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_poll_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("poll_msgs_encode");

    for &(count, size) in &[(1usize, 4096usize), (16, 256), (256, 64), (64, 16384)] {
        let messages: Vec<PolledMessage> = (0..count)
            .map(|i| PolledMessage {
                from_client: ClientId::from_bytes([i as u8; 16]),
                message_id: i as u32,
                kind: MessageType::Text,
                content: vec![0x5A; size],
            })
            .collect();
        let response = Response::polled_messages(PolledMessages { messages });
        group.throughput(Throughput::Bytes(response.payload_len() as u64));

        group.bench_function(format!("{count}x{size}b"), |b| {
            b.iter_batched(
                || response.clone(),
                |response| {
                    let mut buf = BytesMut::new();
                    let mut codec = RequestCodec::default();
                    codec.encode(response, &mut buf).unwrap();
                    buf
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_request_decode, bench_poll_encode);
criterion_main!(benches);
