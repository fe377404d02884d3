//! Fuzz target for Payload::from_frame
//!
//! Feeds arbitrary CBOR bodies under every opcode to find:
//! - Panics on malformed CBOR
//! - Type confusion between opcodes
//! - Oversized strings or collections
//!
//! Invalid input must come back as an error, never a panic.

#![no_main]

use bytes::Bytes;
use huddle_proto::{Frame, FrameHeader, Opcode, Payload};
use libfuzzer_sys::fuzz_target;

const OPCODES: [Opcode; 13] = [
    Opcode::Hello,
    Opcode::HelloReply,
    Opcode::Goodbye,
    Opcode::Ping,
    Opcode::Pong,
    Opcode::Error,
    Opcode::JoinGroup,
    Opcode::SendMessage,
    Opcode::Typing,
    Opcode::StopTyping,
    Opcode::ReceiveMessage,
    Opcode::UserTyping,
    Opcode::UserStoppedTyping,
];

fuzz_target!(|data: &[u8]| {
    for opcode in OPCODES {
        let frame = Frame::new(FrameHeader::new(opcode), Bytes::copy_from_slice(data));

        if let Ok(payload) = Payload::from_frame(&frame) {
            // Whatever decodes must be able to travel again.
            let _ = payload.into_frame().expect("decoded payload must encode");
        }
    }
});
