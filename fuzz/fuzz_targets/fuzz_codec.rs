// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use lilith_mitm::mcp::codec::JsonRpcCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // No sequence of bytes may panic the framing layer. Logic correctness
    // is covered by unit tests; this target is about robustness.
    let mut codec = JsonRpcCodec::new();
    let mut buffer = BytesMut::from(data);

    while let Ok(Some(_)) = codec.decode(&mut buffer) {}
    let _ = codec.decode_eof(&mut buffer);
});
