//! Connection state machine.
//!
//! One `Connection` exists per open workspace. It owns the session lifecycle
//! (handshake, heartbeat, timeouts, teardown) and nothing else; chat frames
//! are routed by the client once the connection reports [`ConnectionState::Open`].
//!
//! Methods take time as input and return [`ConnectionAction`]s for the
//! driver to execute, keeping the machine free of I/O.
//!
//! # State Machine
//!
//! ```text
//! ┌────────────┐   HelloReply   ┌──────┐
//! │ Connecting │───────────────>│ Open │
//! └────────────┘                └──────┘
//!       │                          │
//!       │ failure / timeout        │ failure / idle / Goodbye / close
//!       ↓                          ↓
//!  ┌─────────┐     close      ┌────────┐
//!  │ Errored │───────────────>│ Closed │
//!  └─────────┘                └────────┘
//! ```
//!
//! `Errored` and `Closed` are terminal: retrying means building a new
//! `Connection`.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use huddle_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::session::{Goodbye, Hello},
};
use tracing::{debug, info};

use crate::{
    error::ConnectionError,
    ids::{Identity, WorkspaceId},
};

/// Protocol version announced in `Hello`.
pub const PROTOCOL_VERSION: u8 = 1;

/// Time allowed to complete the Hello/HelloReply handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum time allowed without any inbound activity before the connection is
/// closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval at which the connection sends Ping frames while open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Send this frame to the server
    SendFrame(Frame),

    /// Tear down the transport
    Close {
        /// Reason for closing the connection
        reason: String,
    },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport establishing or handshake in flight
    Connecting,
    /// Handshake complete, chat traffic allowed
    Open,
    /// Failed before reaching `Open`
    Errored,
    /// Torn down (terminal)
    Closed,
}

impl ConnectionState {
    /// Whether the connection can still carry traffic now or later.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Errored => "errored",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for completing handshake
    pub handshake_timeout: Duration,
    /// Idle timeout before disconnecting
    pub idle_timeout: Duration,
    /// Heartbeat interval (should be < idle_timeout / 2)
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

/// Connection state machine
///
/// Pure: no I/O and no stored environment. Generic over `Instant` so the
/// simulation harness can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct Connection<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    workspace_id: WorkspaceId,
    state: ConnectionState,
    config: ConnectionConfig,
    last_activity: I,
    last_heartbeat: Option<I>,
    hello_sent: bool,
    session_id: Option<u64>,
}

impl<I> Connection<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a connection for `workspace_id` in [`ConnectionState::Connecting`].
    ///
    /// The handshake timeout starts counting at `now`.
    pub fn new(workspace_id: WorkspaceId, now: I, config: ConnectionConfig) -> Self {
        Self {
            workspace_id,
            state: ConnectionState::Connecting,
            config,
            last_activity: now,
            last_heartbeat: None,
            hello_sent: false,
            session_id: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Workspace this connection is scoped to.
    #[must_use]
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// Session ID assigned by server. `None` until open.
    #[must_use]
    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }

    /// Start the handshake once the transport is connected.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if not connecting or Hello was
    ///   already sent
    pub fn send_hello(
        &mut self,
        identity: &Identity,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connecting || self.hello_sent {
            return Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "send_hello",
            });
        }

        self.hello_sent = true;
        self.last_activity = now;

        let hello = Payload::Hello(Hello {
            version: PROTOCOL_VERSION,
            project_id: self.workspace_id.as_str().to_string(),
            user_id: identity.user_id.as_str().to_string(),
            username: identity.display_name.clone(),
        });

        Ok(vec![ConnectionAction::SendFrame(hello.into_frame()?)])
    }

    /// Transport-level failure.
    ///
    /// `Connecting` becomes `Errored` and `Open` becomes `Closed`; terminal
    /// states are unchanged. Returns the resulting state.
    pub fn fail(&mut self, reason: &str) -> ConnectionState {
        let next = match self.state {
            ConnectionState::Connecting => ConnectionState::Errored,
            ConnectionState::Open => ConnectionState::Closed,
            terminal => terminal,
        };

        if next != self.state {
            info!(
                workspace = %self.workspace_id,
                from = %self.state,
                to = %next,
                reason,
                "connection failed"
            );
        }
        self.state = next;
        next
    }

    /// Local close. Idempotent.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            debug!(workspace = %self.workspace_id, from = %self.state, "connection closed locally");
        }
        self.state = ConnectionState::Closed;
    }

    /// Mark connection as active (call when receiving any frame).
    pub fn update_activity(&mut self, now: I) {
        self.last_activity = now;
    }

    /// Timeout that has elapsed for the current state, if any.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<ConnectionError> {
        let elapsed = now - self.last_activity;

        match self.state {
            ConnectionState::Connecting if elapsed > self.config.handshake_timeout => {
                Some(ConnectionError::HandshakeTimeout { elapsed })
            },
            ConnectionState::Open if elapsed > self.config.idle_timeout => {
                Some(ConnectionError::IdleTimeout { elapsed })
            },
            _ => None,
        }
    }

    /// Periodic maintenance: timeout detection and heartbeats.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if let Some(timeout) = self.check_timeout(now) {
            let reason = timeout.to_string();
            self.fail(&reason);
            return vec![ConnectionAction::Close { reason }];
        }

        if self.state != ConnectionState::Open {
            return Vec::new();
        }

        let heartbeat_due = match self.last_heartbeat {
            None => true,
            Some(last) => now - last >= self.config.heartbeat_interval,
        };

        if heartbeat_due {
            self.last_heartbeat = Some(now);
            return vec![ConnectionAction::SendFrame(Frame::new(
                FrameHeader::new(Opcode::Ping),
                Vec::new(),
            ))];
        }

        Vec::new()
    }

    /// Process an inbound session frame.
    ///
    /// Chat frames are not handled here; callers route them once
    /// [`Self::state`] is `Open`.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::UnexpectedFrame` if the opcode is invalid for the
    ///   current state
    /// - `ConnectionError::Protocol` if the body fails to decode
    pub fn handle_frame(
        &mut self,
        frame: &Frame,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let unexpected =
            |state| ConnectionError::UnexpectedFrame { state, opcode: frame.header.opcode() };

        let Some(opcode) = frame.opcode() else {
            return Err(unexpected(self.state));
        };

        if !self.state.is_live() {
            return Err(unexpected(self.state));
        }

        self.last_activity = now;

        match (self.state, opcode) {
            (ConnectionState::Connecting, Opcode::HelloReply) if self.hello_sent => {
                let Payload::HelloReply(reply) = Payload::from_frame(frame)? else {
                    return Err(unexpected(self.state));
                };

                info!(workspace = %self.workspace_id, session_id = reply.session_id, "connection open");
                self.state = ConnectionState::Open;
                self.session_id = Some(reply.session_id);
                Ok(Vec::new())
            },

            (ConnectionState::Open, Opcode::Ping) => Ok(vec![ConnectionAction::SendFrame(
                Frame::new(FrameHeader::new(Opcode::Pong), Vec::new()),
            )]),

            // Activity already updated
            (ConnectionState::Open, Opcode::Pong) => Ok(Vec::new()),

            (_, Opcode::Goodbye) => {
                let Payload::Goodbye(Goodbye { reason }) = Payload::from_frame(frame)? else {
                    return Err(unexpected(self.state));
                };

                let reason = format!("server goodbye: {reason}");
                self.fail(&reason);
                Ok(vec![ConnectionAction::Close { reason }])
            },

            (_, Opcode::Error) => {
                let reason = match Payload::from_frame(frame)? {
                    Payload::Error(err) => format!("server error {:#06x}: {}", err.code, err.message),
                    _ => return Err(unexpected(self.state)),
                };

                self.fail(&reason);
                Ok(vec![ConnectionAction::Close { reason }])
            },

            (state, _) => Err(unexpected(state)),
        }
    }
}
