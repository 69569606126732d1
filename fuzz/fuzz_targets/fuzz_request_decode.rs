#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use mailbox_server::core::codec::RequestCodec;
use mailbox_server::core::request::Request;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Direct frame parsing must never panic
    let _ = Request::decode(data);

    // Nor must framing an arbitrary stream, frame by frame
    let mut codec = RequestCodec::new(64 * 1024);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        let _ = Request::decode(&frame);
    }
});
