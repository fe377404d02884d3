//! Client error types.

use huddle_core::{ConnectionError, RoomId, WorkspaceId};
use huddle_proto::ProtocolError;
use thiserror::Error;

/// Errors returned by [`crate::Client::handle`].
///
/// Transport failures, send failures and malformed inbound events are not
/// errors: the client absorbs them and reports them through actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// `open` was called with a workspace other than the client's own.
    #[error("client is scoped to workspace {expected}, not {actual}")]
    WorkspaceMismatch {
        /// Workspace the client was created for.
        expected: WorkspaceId,
        /// Workspace passed to `open`.
        actual: WorkspaceId,
    },

    /// Selected room belongs to a different workspace.
    #[error("room {room_id} is not part of workspace {workspace_id}")]
    RoomNotInWorkspace {
        /// Room that was selected.
        room_id: RoomId,
        /// Workspace of this client.
        workspace_id: WorkspaceId,
    },

    /// Connection state machine rejected an operation.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Outbound frame could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
