//! Error types for the Huddle core.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Errors that can occur during connection state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Received a frame that is not valid in the current state
    #[error("unexpected frame: received opcode {opcode:#06x} in state {state:?}")]
    UnexpectedFrame {
        /// Current state when frame was received
        state: ConnectionState,
        /// Opcode of the unexpected frame
        opcode: u16,
    },

    /// Handshake did not complete within timeout
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Connection idle timeout exceeded
    #[error("idle timeout after {elapsed:?}")]
    IdleTimeout {
        /// How long connection was idle
        elapsed: Duration,
    },

    /// Protocol error from frame parsing/validation
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<huddle_proto::ProtocolError> for ConnectionError {
    fn from(err: huddle_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// An identifier was empty (or whitespace only).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{kind} id must not be empty")]
pub struct InvalidId {
    /// Which identifier was rejected (`workspace`, `room` or `user`).
    pub kind: &'static str,
}
