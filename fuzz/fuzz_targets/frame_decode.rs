//! Fuzz target for Frame::decode
//!
//! Arbitrary byte sequences must never panic the frame decoder. Looks for:
//! - Integer overflows in size calculations
//! - Buffer over-reads
//! - Headers that bypass magic, version or size checks
//!
//! A frame that decodes must re-encode to the bytes it was read from.

#![no_main]

use huddle_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf).expect("decoded frame must encode");
    assert_eq!(&buf[..], &data[..buf.len()], "re-encoding changed the frame");
});
