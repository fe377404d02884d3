//! View-layer intents.

use huddle_client::{ClientEvent, ConfirmedMessage};
use huddle_core::{Room, RoomId, WorkspaceId};

/// A write originating from the user or the view layer.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Enter the workspace and open a connection.
    Open,

    /// Leave the workspace and close the connection.
    Close,

    /// Select a room.
    SelectRoom(Room),

    /// Keystroke in the composer of a room.
    Keystroke {
        /// Room whose composer received input.
        room_id: RoomId,
    },

    /// Submit the composer contents.
    Submit {
        /// Room to send to.
        room_id: RoomId,
        /// Message body.
        body: String,
    },

    /// History fetched out of band for a room.
    SeedHistory {
        /// Room the history belongs to.
        room_id: RoomId,
        /// Backlog in server order.
        messages: Vec<ConfirmedMessage>,
    },

    /// Stop the runtime.
    Quit,
}

impl Intent {
    /// Translate into a client event for `workspace_id`. `None` for
    /// [`Intent::Quit`], which the runtime handles itself.
    pub fn into_event<I>(self, workspace_id: &WorkspaceId) -> Option<ClientEvent<I>> {
        let event = match self {
            Self::Open => ClientEvent::Open { workspace_id: workspace_id.clone() },
            Self::Close => ClientEvent::Close,
            Self::SelectRoom(room) => ClientEvent::SelectRoom(room),
            Self::Keystroke { room_id } => ClientEvent::Keystroke { room_id },
            Self::Submit { room_id, body } => ClientEvent::SendMessage { room_id, body },
            Self::SeedHistory { room_id, messages } => {
                ClientEvent::SeedHistory { room_id, messages }
            },
            Self::Quit => return None,
        };
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn submit_becomes_send_message() {
        let workspace_id = WorkspaceId::new("acme").unwrap();
        let room_id = RoomId::new("general").unwrap();

        let event = Intent::Submit { room_id: room_id.clone(), body: "hi".into() }
            .into_event::<Instant>(&workspace_id);

        assert!(matches!(
            event,
            Some(ClientEvent::SendMessage { room_id: r, body }) if r == room_id && body == "hi"
        ));
    }

    #[test]
    fn open_carries_workspace() {
        let workspace_id = WorkspaceId::new("acme").unwrap();

        let event = Intent::Open.into_event::<Instant>(&workspace_id);

        assert!(matches!(event, Some(ClientEvent::Open { workspace_id: w }) if w == workspace_id));
    }

    #[test]
    fn quit_has_no_event() {
        let workspace_id = WorkspaceId::new("acme").unwrap();
        assert!(Intent::Quit.into_event::<Instant>(&workspace_id).is_none());
    }
}
