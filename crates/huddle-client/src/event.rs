//! Client events and actions.

use huddle_core::{ConnectionState, Room, RoomId, WorkspaceId};
use huddle_proto::Frame;

use crate::store::ConfirmedMessage;

/// Events the caller feeds into the client.
///
/// Every input goes through this one type, in the order it happened; the
/// client applies them strictly in that order.
///
/// Generic over `I` (Instant type) to support both production and
/// simulated time.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// User entered the workspace view.
    Open {
        /// Workspace to connect to.
        workspace_id: WorkspaceId,
    },

    /// User left the workspace view.
    Close,

    /// Transport requested by [`ClientAction::Connect`] is up.
    TransportConnected,

    /// Transport could not connect or dropped.
    TransportFailed {
        /// Human-readable cause.
        reason: String,
    },

    /// Frame received from server.
    FrameReceived(Frame),

    /// The transport rejected a frame produced by [`ClientAction::Send`].
    SendFailed {
        /// The frame that was not delivered.
        frame: Frame,
        /// Human-readable cause.
        reason: String,
    },

    /// User selected a room.
    SelectRoom(Room),

    /// User submitted a message.
    SendMessage {
        /// Target room.
        room_id: RoomId,
        /// Message body as typed.
        body: String,
    },

    /// User pressed a key in the composer.
    Keystroke {
        /// Room the composer belongs to.
        room_id: RoomId,
    },

    /// History backlog from the CRUD service.
    SeedHistory {
        /// Room the backlog belongs to.
        room_id: RoomId,
        /// Messages, oldest first.
        messages: Vec<ConfirmedMessage>,
    },

    /// Time tick for timers and timeouts.
    Tick {
        /// Current time from the environment.
        now: I,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a transport for this workspace, then report
    /// [`ClientEvent::TransportConnected`] or
    /// [`ClientEvent::TransportFailed`].
    Connect {
        /// Workspace to connect to.
        workspace_id: WorkspaceId,
    },

    /// Send a frame to the server.
    Send(Frame),

    /// Tear down the transport.
    Disconnect,

    /// Connection state changed.
    ConnectionChanged {
        /// New state.
        state: ConnectionState,
    },

    /// A room's message sequence changed.
    MessagesChanged {
        /// Room to re-render.
        room_id: RoomId,
    },

    /// A room's typing summary changed.
    PresenceChanged {
        /// Room to re-render.
        room_id: RoomId,
    },
}
