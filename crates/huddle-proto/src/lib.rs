//! Wire protocol for Huddle.
//!
//! Every event that crosses the real-time connection is a [`Frame`]: a fixed
//! 12-byte binary [`FrameHeader`] followed by a CBOR-encoded [`Payload`]. The
//! header's [`Opcode`] identifies the event (`joinGroup`, `receiveMessage`,
//! `userTyping`, ...) so routing never needs to deserialize the body.
//!
//! # Components
//!
//! - [`FrameHeader`]: magic, version, opcode and payload size
//! - [`Frame`]: header plus raw payload bytes
//! - [`Opcode`]: numeric event identifiers and their event names
//! - [`Payload`]: typed event bodies (session, chat, presence)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcode::Opcode;
pub use payloads::{ErrorPayload, Payload};
