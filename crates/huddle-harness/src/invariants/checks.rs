//! Standard invariant checks.
//!
//! These invariants capture behavioral properties that must always hold.
//! They verify WHAT must be true, not specific test scenarios.

use std::collections::HashSet;

use huddle_client::{MessageKey, MessageState};

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A server message is displayed at most once per room.
///
/// The transport is at-least-once, so the client must drop redelivered ids.
pub struct UniqueServerIds;

impl Invariant for UniqueServerIds {
    fn name(&self) -> &'static str {
        "unique_server_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (room_id, room) in &client.rooms {
                let mut seen = HashSet::new();
                for id in room.server_ids() {
                    if !seen.insert(id) {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {} room {room_id}: message {id} displayed twice",
                                client.id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Confirmed messages form a prefix; unconfirmed ones sit at the tail.
///
/// Also checks that the key kind matches the state: server keys are
/// confirmed, local keys never are.
pub struct ConfirmedPrefixFirst;

impl Invariant for ConfirmedPrefixFirst {
    fn name(&self) -> &'static str {
        "confirmed_prefix_first"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (room_id, room) in &client.rooms {
                let mut in_tail = false;
                for (index, (key, message_state)) in room.messages.iter().enumerate() {
                    let confirmed = *message_state == MessageState::Confirmed;
                    let server_key = matches!(key, MessageKey::Server(_));

                    if confirmed != server_key {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {} room {room_id}: entry {index} has key {key:?} but state {message_state:?}",
                                client.id
                            ),
                        });
                    }

                    if !confirmed {
                        in_tail = true;
                    } else if in_tail {
                        return Err(Violation {
                            invariant: self.name(),
                            message: format!(
                                "client {} room {room_id}: confirmed entry {index} after an unconfirmed one",
                                client.id
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// The local user never appears in their own typing indicator.
pub struct NoSelfTyping;

impl Invariant for NoSelfTyping {
    fn name(&self) -> &'static str {
        "no_self_typing"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some((room_id, _)) = client.rooms.iter().find(|(_, room)| room.self_typing) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {} ({}) shown as typing in {room_id}",
                        client.id, client.user_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Local tokens are unique within a client, across all rooms.
pub struct LocalTokensUnique;

impl Invariant for LocalTokensUnique {
    fn name(&self) -> &'static str {
        "local_tokens_unique"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            let tokens = client.rooms.values().flat_map(|room| {
                room.messages.iter().filter_map(|(key, _)| match key {
                    MessageKey::Local(token) => Some(*token),
                    MessageKey::Server(_) => None,
                })
            });

            for token in tokens {
                if !seen.insert(token) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("client {}: token {token} used twice", client.id),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use huddle_client::LocalToken;
    use huddle_core::{RoomId, UserId};

    use super::*;
    use crate::{ClientSnapshot, RoomSnapshot};

    fn client_with(room: RoomSnapshot) -> SystemSnapshot {
        SystemSnapshot::single(ClientSnapshot {
            id: 0,
            user_id: UserId::new("alice").unwrap(),
            connection: None,
            selected_room: None,
            rooms: BTreeMap::from([(RoomId::new("general").unwrap(), room)]),
        })
    }

    fn server(id: &str) -> (MessageKey, MessageState) {
        (MessageKey::Server(id.to_string()), MessageState::Confirmed)
    }

    fn local(seq: u64) -> (MessageKey, MessageState) {
        let token = LocalToken::parse(&format!("local:{:016x}:{seq}", 7)).unwrap();
        (MessageKey::Local(token), MessageState::Provisional)
    }

    #[test]
    fn duplicate_server_id_detected() {
        let state = client_with(RoomSnapshot {
            messages: vec![server("m1"), server("m1")],
            self_typing: false,
        });

        let violation = UniqueServerIds.check(&state).unwrap_err();
        assert_eq!(violation.invariant, "unique_server_ids");
    }

    #[test]
    fn confirmed_after_provisional_detected() {
        let state = client_with(RoomSnapshot {
            messages: vec![server("m1"), local(1), server("m2")],
            self_typing: false,
        });

        assert!(ConfirmedPrefixFirst.check(&state).is_err());
    }

    #[test]
    fn well_formed_room_passes() {
        let state = client_with(RoomSnapshot {
            messages: vec![server("m1"), server("m2"), local(1), local(2)],
            self_typing: false,
        });

        assert!(UniqueServerIds.check(&state).is_ok());
        assert!(ConfirmedPrefixFirst.check(&state).is_ok());
        assert!(LocalTokensUnique.check(&state).is_ok());
    }

    #[test]
    fn self_typing_detected() {
        let state = client_with(RoomSnapshot { messages: Vec::new(), self_typing: true });

        assert!(NoSelfTyping.check(&state).is_err());
    }
}
