//! CBOR-encoded event bodies.
//!
//! The frame header's opcode identifies the event, so only the inner struct is
//! serialized (no variant tag). Field names are camelCase to match the event
//! vocabulary spoken by the server.
//!
//! A body that fails to decode, including one missing a required field, is
//! reported as [`ProtocolError::CborDecode`]. Callers treat that as a
//! malformed event and drop it.

pub mod chat;
pub mod presence;
pub mod session;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// Every frame body, one variant per [`Opcode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session
    /// Client handshake
    Hello(session::Hello),
    /// Server handshake acknowledgement
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),
    /// Keepalive request
    Ping,
    /// Keepalive response
    Pong,
    /// Server-reported error
    Error(ErrorPayload),

    // Outbound chat
    /// Subscribe to a group
    JoinGroup(chat::JoinGroup),
    /// Submit a message
    SendMessage(chat::SendMessage),
    /// Local typing started
    Typing(presence::Typing),
    /// Local typing stopped
    StopTyping(presence::StopTyping),

    // Inbound chat
    /// Confirmed message
    ReceiveMessage(chat::ChatMessage),
    /// Remote typing started
    UserTyping(presence::UserTyping),
    /// Remote typing stopped
    UserStoppedTyping(presence::UserStoppedTyping),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Frame was rejected by the server.
    pub const FRAME_REJECTED: u16 = 0x0001;
    /// Group does not exist in this workspace.
    pub const GROUP_NOT_FOUND: u16 = 0x0002;
    /// Invalid payload format.
    pub const INVALID_PAYLOAD: u16 = 0x0004;
    /// Operation attempted before the handshake completed.
    pub const NOT_AUTHENTICATED: u16 = 0x0008;

    /// Create a frame rejection error.
    pub fn frame_rejected(reason: impl Into<String>) -> Self {
        Self { code: Self::FRAME_REJECTED, message: reason.into() }
    }

    /// Create a group not found error.
    pub fn group_not_found(group_id: &str) -> Self {
        Self { code: Self::GROUP_NOT_FOUND, message: format!("group not found: {group_id}") }
    }

    /// Create an invalid payload error.
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_PAYLOAD, message: msg.into() }
    }

    /// Create a not-authenticated error.
    pub fn not_authenticated() -> Self {
        Self { code: Self::NOT_AUTHENTICATED, message: "hello required".to_string() }
    }
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::Ping => Opcode::Ping,
            Self::Pong => Opcode::Pong,
            Self::Error(_) => Opcode::Error,
            Self::JoinGroup(_) => Opcode::JoinGroup,
            Self::SendMessage(_) => Opcode::SendMessage,
            Self::Typing(_) => Opcode::Typing,
            Self::StopTyping(_) => Opcode::StopTyping,
            Self::ReceiveMessage(_) => Opcode::ReceiveMessage,
            Self::UserTyping(_) => Opcode::UserTyping,
            Self::UserStoppedTyping(_) => Opcode::UserStoppedTyping,
        }
    }

    /// Encode the body into `dst`.
    ///
    /// Does not enforce [`FrameHeader::MAX_PAYLOAD_SIZE`]; that happens in
    /// [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Ping | Self::Pong => Ok(()), // Zero-byte payloads
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::JoinGroup(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Typing(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::StopTyping(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::ReceiveMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserTyping(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::UserStoppedTyping(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a body for the given opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed the frame limit
    /// - `ProtocolError::CborDecode` if the body is malformed or incomplete
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(from_cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(from_cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(from_cbor(bytes)?),
            Opcode::Ping => Self::Ping,
            Opcode::Pong => Self::Pong,
            Opcode::Error => Self::Error(from_cbor(bytes)?),
            Opcode::JoinGroup => Self::JoinGroup(from_cbor(bytes)?),
            Opcode::SendMessage => Self::SendMessage(from_cbor(bytes)?),
            Opcode::Typing => Self::Typing(from_cbor(bytes)?),
            Opcode::StopTyping => Self::StopTyping(from_cbor(bytes)?),
            Opcode::ReceiveMessage => Self::ReceiveMessage(from_cbor(bytes)?),
            Opcode::UserTyping => Self::UserTyping(from_cbor(bytes)?),
            Opcode::UserStoppedTyping => Self::UserStoppedTyping(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Encode into a transport frame with the matching opcode.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Frame::new(FrameHeader::new(self.opcode()), buf))
    }

    /// Parse the body of a transport frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is unrecognized
    /// - `ProtocolError::CborDecode` if the body is malformed or incomplete
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}
