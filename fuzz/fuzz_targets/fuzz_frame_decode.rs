//! Fuzz target for request frame decoding.
//!
//! Arbitrary bytes must decode to a frame or a `FramingError`, never panic,
//! and a successful decode must re-encode to the same bytes.

#![no_main]

use hoptrace::wire::{FrameLimits, RequestFrame};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let limits = FrameLimits {
        max_hint_len: 1024,
        max_payload: 1 << 20,
    };
    if let Ok(frame) = RequestFrame::decode(data, &limits) {
        let encoded = frame.encode().expect("decoded frame re-encodes");
        assert_eq!(encoded, data);
    }
});
