//! Observable state snapshots for invariant checking.
//!
//! Snapshots capture the observable state of the system at a point in time.
//! Invariants operate on snapshots rather than live state to ensure
//! consistent, atomic checks.

use std::collections::BTreeMap;

use huddle_client::{Client, MessageKey, MessageState};
use huddle_core::{ConnectionState, Environment, RoomId, UserId};

/// Snapshot of the entire system state.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }

    /// Create a snapshot from multiple clients.
    pub fn from_clients(clients: Vec<ClientSnapshot>) -> Self {
        Self { clients }
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Client identifier within the simulation.
    pub id: usize,
    /// Local user.
    pub user_id: UserId,
    /// Connection state, `None` if no connection exists.
    pub connection: Option<ConnectionState>,
    /// Selected room.
    pub selected_room: Option<RoomId>,
    /// Rooms with messages, plus the selected room.
    pub rooms: BTreeMap<RoomId, RoomSnapshot>,
}

impl ClientSnapshot {
    /// Capture the observable state of `client`.
    pub fn capture<E: Environment>(id: usize, client: &Client<E>) -> Self {
        let user_id = client.identity().user_id.clone();
        let room_ids = client.store().rooms().cloned().chain(client.selected_room().cloned());

        let rooms = room_ids
            .map(|room_id| {
                let snapshot = RoomSnapshot {
                    messages: client
                        .sequence_for(&room_id)
                        .map(|m| (m.key.clone(), m.state))
                        .collect(),
                    self_typing: client.is_typing(&room_id, &user_id),
                };
                (room_id, snapshot)
            })
            .collect();

        Self {
            id,
            connection: client.connection_state(),
            selected_room: client.selected_room().cloned(),
            user_id,
            rooms,
        }
    }
}

/// Snapshot of a room's observable state.
#[derive(Debug, Clone, Default)]
pub struct RoomSnapshot {
    /// Displayed sequence: key and state of each message, in order.
    pub messages: Vec<(MessageKey, MessageState)>,
    /// Whether the local user is listed as typing.
    pub self_typing: bool,
}

impl RoomSnapshot {
    /// Server ids of the confirmed messages, in display order.
    pub fn server_ids(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().filter_map(|(key, _)| match key {
            MessageKey::Server(id) => Some(id.as_str()),
            MessageKey::Local(_) => None,
        })
    }
}
