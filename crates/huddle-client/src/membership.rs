//! Which room the connection listens to.
//!
//! Selecting a room issues a join for it on the current connection. Previous
//! rooms are never left explicitly: messages still in flight for them keep
//! reconciling into their own sequences. Joins requested before the
//! connection is open are deferred until it opens.

use std::collections::BTreeSet;

use huddle_core::{Room, RoomId, WorkspaceId};
use tracing::debug;

use crate::error::ClientError;

/// Selected room and joins issued on the current connection.
#[derive(Debug)]
pub struct RoomMembership {
    workspace_id: WorkspaceId,
    selected: Option<RoomId>,
    /// Rooms joined on the current connection.
    joined: BTreeSet<RoomId>,
}

impl RoomMembership {
    /// Create a tracker for `workspace_id` with nothing selected.
    pub fn new(workspace_id: WorkspaceId) -> Self {
        Self { workspace_id, selected: None, joined: BTreeSet::new() }
    }

    /// Currently selected room.
    pub fn selected(&self) -> Option<&RoomId> {
        self.selected.as_ref()
    }

    /// Whether a join for `room_id` was issued on the current connection.
    pub fn is_joined(&self, room_id: &RoomId) -> bool {
        self.joined.contains(room_id)
    }

    /// Select `room`. Returns the room to join now, if any.
    ///
    /// With `open == false` the join is deferred to [`Self::on_open`].
    ///
    /// # Errors
    ///
    /// - `ClientError::RoomNotInWorkspace` if `room` belongs elsewhere
    pub fn select(&mut self, room: &Room, open: bool) -> Result<Option<RoomId>, ClientError> {
        if room.workspace_id != self.workspace_id {
            return Err(ClientError::RoomNotInWorkspace {
                room_id: room.id.clone(),
                workspace_id: self.workspace_id.clone(),
            });
        }

        self.selected = Some(room.id.clone());

        if !open {
            debug!(room = %room.id, "join deferred until connection opens");
            return Ok(None);
        }

        Ok(self.join_selected())
    }

    /// Connection opened: flush the deferred join.
    pub fn on_open(&mut self) -> Option<RoomId> {
        self.join_selected()
    }

    fn join_selected(&mut self) -> Option<RoomId> {
        let room_id = self.selected.clone()?;
        self.joined.insert(room_id.clone()).then_some(room_id)
    }

    /// Connection lost: joins must be re-issued on the next connection.
    pub fn reset_joins(&mut self) {
        self.joined.clear();
    }

    /// Workspace closed: forget the selection and all joins.
    pub fn release(&mut self) {
        self.selected = None;
        self.joined.clear();
    }
}
