//! Opcode table.
//!
//! Opcodes are grouped by range: `0x00xx` session management, `0x01xx`
//! client-emitted chat events, `0x02xx` server-emitted chat events.

/// Operation code carried in every [`crate::FrameHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    /// Client handshake.
    Hello = 0x0001,
    /// Server handshake acknowledgement.
    HelloReply = 0x0002,
    /// Graceful disconnect.
    Goodbye = 0x0003,
    /// Keepalive request.
    Ping = 0x0004,
    /// Keepalive response.
    Pong = 0x0005,
    /// Server-reported error.
    Error = 0x000F,

    /// Subscribe to a group's events.
    JoinGroup = 0x0101,
    /// Submit a chat message.
    SendMessage = 0x0102,
    /// Local user started typing.
    Typing = 0x0103,
    /// Local user stopped typing.
    StopTyping = 0x0104,

    /// Server-confirmed chat message.
    ReceiveMessage = 0x0201,
    /// Remote user started typing.
    UserTyping = 0x0202,
    /// Remote user stopped typing.
    UserStoppedTyping = 0x0203,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x0004 => Some(Self::Ping),
            0x0005 => Some(Self::Pong),
            0x000F => Some(Self::Error),
            0x0101 => Some(Self::JoinGroup),
            0x0102 => Some(Self::SendMessage),
            0x0103 => Some(Self::Typing),
            0x0104 => Some(Self::StopTyping),
            0x0201 => Some(Self::ReceiveMessage),
            0x0202 => Some(Self::UserTyping),
            0x0203 => Some(Self::UserStoppedTyping),
            _ => None,
        }
    }

    /// Event name used by the transport vocabulary.
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::HelloReply => "helloReply",
            Self::Goodbye => "goodbye",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::JoinGroup => "joinGroup",
            Self::SendMessage => "sendMessage",
            Self::Typing => "typing",
            Self::StopTyping => "stopTyping",
            Self::ReceiveMessage => "receiveMessage",
            Self::UserTyping => "userTyping",
            Self::UserStoppedTyping => "userStoppedTyping",
        }
    }

    /// Session-layer opcodes are consumed by the connection state machine and
    /// never reach the chat components.
    #[must_use]
    pub const fn is_session(self) -> bool {
        matches!(
            self,
            Self::Hello | Self::HelloReply | Self::Goodbye | Self::Ping | Self::Pong | Self::Error
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.event_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Opcode; 13] = [
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

    #[test]
    fn raw_values_are_recognized() {
        for opcode in ALL {
            assert_eq!(Opcode::from_u16(opcode.to_u16()), Some(opcode));
        }
        assert_eq!(Opcode::from_u16(0xFFFF), None);
    }

    #[test]
    fn event_names_match_vocabulary() {
        assert_eq!(Opcode::JoinGroup.event_name(), "joinGroup");
        assert_eq!(Opcode::SendMessage.event_name(), "sendMessage");
        assert_eq!(Opcode::ReceiveMessage.event_name(), "receiveMessage");
        assert_eq!(Opcode::UserStoppedTyping.to_string(), "userStoppedTyping");
    }

    #[test]
    fn only_session_opcodes_are_session() {
        let session: Vec<_> = ALL.iter().filter(|op| op.is_session()).collect();
        assert_eq!(session.len(), 6);
        assert!(!Opcode::Typing.is_session());
    }
}
