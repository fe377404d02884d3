//! Client dispatch tests.
//!
//! Drive a single `Client` through its event entry point with a manual clock
//! and inspect the actions it returns.

use std::{
    ops::Sub,
    sync::{Arc, Mutex},
    time::Duration,
};

use huddle_client::{
    Client, ClientAction, ClientConfig, ClientError, ClientEvent, ConnectionState, Environment,
    Identity, MessageState, RetryPolicy, Room, RoomId, UserId, WorkspaceId,
};
use huddle_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::{
        chat::{ChatMessage, Sender},
        presence::{UserStoppedTyping, UserTyping},
        session::HelloReply,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct At(Duration);

impl Sub for At {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

#[derive(Clone, Default)]
struct ManualEnv {
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualEnv {
    fn advance(&self, by: Duration) -> At {
        let mut elapsed = self.elapsed.lock().unwrap();
        *elapsed += by;
        At(*elapsed)
    }
}

impl Environment for ManualEnv {
    type Instant = At;

    fn now(&self) -> At {
        At(*self.elapsed.lock().unwrap())
    }

    fn wall_clock_millis(&self) -> u64 {
        1_700_000_000_000 + self.now().0.as_millis() as u64
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(7);
    }
}

fn workspace() -> WorkspaceId {
    WorkspaceId::new("acme").unwrap()
}

fn general() -> Room {
    Room::new(RoomId::new("general").unwrap(), workspace(), "General", UserId::new("alice").unwrap())
}

fn random() -> Room {
    Room::new(RoomId::new("random").unwrap(), workspace(), "Random", UserId::new("alice").unwrap())
}

fn alice() -> Identity {
    Identity::new(UserId::new("alice").unwrap(), "Alice")
}

fn client_with(config: ClientConfig) -> (Client<ManualEnv>, ManualEnv) {
    let env = ManualEnv::default();
    (Client::new(env.clone(), alice(), workspace(), config), env)
}

/// Payloads of every `Send` action, in order.
fn sent(actions: &[ClientAction]) -> Vec<Payload> {
    actions
        .iter()
        .filter_map(|action| match action {
            ClientAction::Send(frame) => Some(Payload::from_frame(frame).unwrap()),
            _ => None,
        })
        .collect()
}

fn count(actions: &[ClientAction], opcode: Opcode) -> usize {
    sent(actions).iter().filter(|p| p.opcode() == opcode).count()
}

fn frame(payload: Payload) -> ClientEvent<At> {
    ClientEvent::FrameReceived(payload.into_frame().unwrap())
}

fn echo(id: &str, sender: &str, body: &str, token: Option<String>) -> ClientEvent<At> {
    frame(Payload::ReceiveMessage(ChatMessage {
        id: id.to_string(),
        content: body.to_string(),
        group_id: "general".to_string(),
        sender: Sender { id: sender.to_string(), username: sender.to_string() },
        created_at: 0,
        client_token: token,
    }))
}

fn user_typing(user: &str, name: &str) -> ClientEvent<At> {
    frame(Payload::UserTyping(UserTyping {
        user_id: user.to_string(),
        group_id: "general".to_string(),
        username: name.to_string(),
    }))
}

/// Open the connection and complete the handshake. Returns the actions of
/// the final (HelloReply) step.
fn open(client: &mut Client<ManualEnv>) -> Vec<ClientAction> {
    client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap();
    client.handle(ClientEvent::TransportConnected).unwrap();
    client.handle(frame(Payload::HelloReply(HelloReply { session_id: 9 }))).unwrap()
}

fn open_in_general(config: ClientConfig) -> (Client<ManualEnv>, ManualEnv) {
    let (mut client, env) = client_with(config);
    open(&mut client);
    client.handle(ClientEvent::SelectRoom(general())).unwrap();
    (client, env)
}

#[test]
fn open_emits_connect_then_hello() {
    let (mut client, _env) = client_with(ClientConfig::default());

    let actions = client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap();
    assert_eq!(actions, vec![
        ClientAction::Connect { workspace_id: workspace() },
        ClientAction::ConnectionChanged { state: ConnectionState::Connecting },
    ]);

    let actions = client.handle(ClientEvent::TransportConnected).unwrap();
    assert_eq!(count(&actions, Opcode::Hello), 1);

    let actions = client.handle(frame(Payload::HelloReply(HelloReply { session_id: 9 }))).unwrap();
    assert_eq!(actions, vec![ClientAction::ConnectionChanged { state: ConnectionState::Open }]);
    assert_eq!(client.connection_state(), Some(ConnectionState::Open));
}

#[test]
fn second_open_is_noop() {
    let (mut client, _env) = client_with(ClientConfig::default());
    client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap();

    assert!(client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap().is_empty());

    let other = WorkspaceId::new("globex").unwrap();
    assert!(matches!(
        client.handle(ClientEvent::Open { workspace_id: other }),
        Err(ClientError::WorkspaceMismatch { .. })
    ));
}

#[test]
fn join_deferred_until_open() {
    let (mut client, _env) = client_with(ClientConfig::default());

    client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap();
    let actions = client.handle(ClientEvent::SelectRoom(general())).unwrap();
    assert_eq!(count(&actions, Opcode::JoinGroup), 0);

    client.handle(ClientEvent::TransportConnected).unwrap();
    let actions = client.handle(frame(Payload::HelloReply(HelloReply { session_id: 9 }))).unwrap();

    let joins: Vec<_> = sent(&actions)
        .into_iter()
        .filter_map(|p| match p {
            Payload::JoinGroup(join) => Some(join.group_id),
            _ => None,
        })
        .collect();
    assert_eq!(joins, vec!["general".to_string()]);
}

#[test]
fn selecting_same_room_twice_joins_once() {
    let (mut client, _env) = client_with(ClientConfig::default());
    open(&mut client);

    let first = client.handle(ClientEvent::SelectRoom(general())).unwrap();
    let second = client.handle(ClientEvent::SelectRoom(general())).unwrap();

    assert_eq!(count(&first, Opcode::JoinGroup) + count(&second, Opcode::JoinGroup), 1);
}

#[test]
fn foreign_room_rejected() {
    let (mut client, _env) = client_with(ClientConfig::default());
    let foreign = Room::new(
        RoomId::new("general").unwrap(),
        WorkspaceId::new("globex").unwrap(),
        "General",
        UserId::new("zed").unwrap(),
    );

    assert!(matches!(
        client.handle(ClientEvent::SelectRoom(foreign)),
        Err(ClientError::RoomNotInWorkspace { .. })
    ));
}

#[test]
fn send_requires_open_connection_and_selected_room() {
    let (mut client, _env) = client_with(ClientConfig::default());
    let room_id = general().id;
    let send = |body: &str| ClientEvent::SendMessage { room_id: room_id.clone(), body: body.into() };

    client.handle(ClientEvent::SelectRoom(general())).unwrap();
    assert!(client.handle(send("hi")).unwrap().is_empty());

    open(&mut client);
    assert!(client.handle(send("   ")).unwrap().is_empty());

    client.handle(ClientEvent::SelectRoom(random())).unwrap();
    assert!(client.handle(send("hi")).unwrap().is_empty());
    assert_eq!(client.sequence_for(&room_id).count(), 0);
}

#[test]
fn send_appends_provisional_and_reconciles_echo() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    let actions = client
        .handle(ClientEvent::SendMessage { room_id: room_id.clone(), body: "hello".into() })
        .unwrap();

    let Some(Payload::SendMessage(send)) = sent(&actions).into_iter().next() else {
        panic!("expected sendMessage first, got {actions:?}");
    };
    assert_eq!(send.content, "hello");
    assert_eq!(send.project_id, "acme");
    assert_eq!(send.sender.id, "alice");
    assert!(send.client_token.as_deref().is_some_and(|t| t.starts_with("local:")));
    assert!(actions.contains(&ClientAction::MessagesChanged { room_id: room_id.clone() }));

    let states: Vec<_> = client.sequence_for(&room_id).map(|m| m.state).collect();
    assert_eq!(states, vec![MessageState::Provisional]);

    // Server does not echo the token: content match.
    client.handle(echo("m1", "alice", "hello", None)).unwrap();

    let messages: Vec<_> = client.sequence_for(&room_id).collect();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, "hello");
    assert_eq!(messages[0].state, MessageState::Confirmed);
}

#[test]
fn echoed_token_reconciles_exactly() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    let mut tokens = Vec::new();
    for _ in 0..2 {
        let actions = client
            .handle(ClientEvent::SendMessage { room_id: room_id.clone(), body: "ok".into() })
            .unwrap();
        if let Some(Payload::SendMessage(send)) = sent(&actions).into_iter().next() {
            tokens.push(send.client_token.unwrap());
        }
    }

    // Echoes arrive in reverse order, each carrying its token.
    client.handle(echo("m2", "alice", "ok", Some(tokens[1].clone()))).unwrap();
    assert_eq!(client.store().unconfirmed_len(&room_id), 1);
    client.handle(echo("m1", "alice", "ok", Some(tokens[0].clone()))).unwrap();

    let states: Vec<_> = client.sequence_for(&room_id).map(|m| m.state).collect();
    assert_eq!(states, vec![MessageState::Confirmed, MessageState::Confirmed]);
}

#[test]
fn messages_for_other_rooms_still_reconcile() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    client.handle(ClientEvent::SendMessage { room_id: room_id.clone(), body: "bye".into() }).unwrap();
    client.handle(ClientEvent::SelectRoom(random())).unwrap();

    client.handle(echo("m1", "alice", "bye", None)).unwrap();

    let states: Vec<_> = client.sequence_for(&room_id).map(|m| m.state).collect();
    assert_eq!(states, vec![MessageState::Confirmed]);
}

#[test]
fn typing_start_once_and_stop_on_send() {
    let (mut client, env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    let mut actions = Vec::new();
    for _ in 0..5 {
        env.advance(Duration::from_millis(200));
        actions.extend(client.handle(ClientEvent::Keystroke { room_id: room_id.clone() }).unwrap());
    }
    assert_eq!(count(&actions, Opcode::Typing), 1);

    let mut after_send = client
        .handle(ClientEvent::SendMessage { room_id: room_id.clone(), body: "hi".into() })
        .unwrap();
    let now = env.advance(Duration::from_secs(10));
    after_send.extend(client.handle(ClientEvent::Tick { now }).unwrap());

    assert_eq!(count(&after_send, Opcode::StopTyping), 1);
    assert_eq!(count(&after_send, Opcode::Typing), 0);

    let fresh = client.handle(ClientEvent::Keystroke { room_id }).unwrap();
    assert_eq!(count(&fresh, Opcode::Typing), 1);
}

#[test]
fn typing_stop_emitted_once_after_window() {
    let (mut client, env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    client.handle(ClientEvent::Keystroke { room_id }).unwrap();

    let now = env.advance(Duration::from_secs(2));
    assert_eq!(count(&client.handle(ClientEvent::Tick { now }).unwrap(), Opcode::StopTyping), 0);

    let now = env.advance(Duration::from_secs(1));
    assert_eq!(count(&client.handle(ClientEvent::Tick { now }).unwrap(), Opcode::StopTyping), 1);

    let now = env.advance(Duration::from_secs(5));
    assert_eq!(count(&client.handle(ClientEvent::Tick { now }).unwrap(), Opcode::StopTyping), 0);
}

#[test]
fn keystroke_after_unticked_window_restarts_typing() {
    let (mut client, env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    let first = client.handle(ClientEvent::Keystroke { room_id: room_id.clone() }).unwrap();
    assert_eq!(count(&first, Opcode::Typing), 1);

    env.advance(Duration::from_millis(3_500));
    let late = client.handle(ClientEvent::Keystroke { room_id }).unwrap();
    assert_eq!(count(&late, Opcode::StopTyping), 1);
    assert_eq!(count(&late, Opcode::Typing), 1);

    let now = env.now();
    assert_eq!(count(&client.handle(ClientEvent::Tick { now }).unwrap(), Opcode::StopTyping), 0);
}

#[test]
fn room_switch_stops_local_typing() {
    let (mut client, _env) = open_in_general(ClientConfig::default());

    client.handle(ClientEvent::Keystroke { room_id: general().id }).unwrap();
    let actions = client.handle(ClientEvent::SelectRoom(random())).unwrap();

    let stops: Vec<_> = sent(&actions)
        .into_iter()
        .filter_map(|p| match p {
            Payload::StopTyping(stop) => Some(stop.group_id),
            _ => None,
        })
        .collect();
    assert_eq!(stops, vec!["general".to_string()]);
}

#[test]
fn remote_typing_expires_and_excludes_self() {
    let (mut client, env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    client.handle(user_typing("alice", "Me")).unwrap();
    assert_eq!(client.typing_summary(&room_id), None);

    let actions = client.handle(user_typing("bob", "Bob")).unwrap();
    assert_eq!(actions, vec![ClientAction::PresenceChanged { room_id: room_id.clone() }]);
    assert_eq!(client.typing_summary(&room_id).map(|s| s.to_string()).as_deref(), Some("Bob is typing..."));

    env.advance(Duration::from_secs(3));
    assert_eq!(client.typing_summary(&room_id), None);
}

#[test]
fn remote_stop_clears_typist() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    client.handle(user_typing("bob", "Bob")).unwrap();
    client
        .handle(frame(Payload::UserStoppedTyping(UserStoppedTyping {
            user_id: "bob".to_string(),
            group_id: "general".to_string(),
        })))
        .unwrap();

    assert!(!client.is_typing(&room_id, &UserId::new("bob").unwrap()));
}

#[test]
fn malformed_event_dropped_without_mutation() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    // userTyping body missing every field but groupId.
    let mut body = Vec::new();
    ciborium::ser::into_writer(&std::collections::BTreeMap::from([("groupId", "general")]), &mut body)
        .unwrap();
    let malformed = Frame::new(FrameHeader::new(Opcode::UserTyping), body);
    assert!(client.handle(ClientEvent::FrameReceived(malformed)).unwrap().is_empty());

    // Empty group id.
    let empty_room = frame(Payload::UserTyping(UserTyping {
        user_id: "bob".to_string(),
        group_id: String::new(),
        username: "Bob".to_string(),
    }));
    assert!(client.handle(empty_room).unwrap().is_empty());

    // The stream keeps working.
    client.handle(echo("m1", "bob", "still here", None)).unwrap();
    assert_eq!(client.sequence_for(&room_id).count(), 1);
}

#[test]
fn close_stops_dispatch_and_clears_presence() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;
    client.handle(user_typing("bob", "Bob")).unwrap();

    let actions = client.handle(ClientEvent::Close).unwrap();
    assert!(actions.contains(&ClientAction::Disconnect));
    assert!(actions.contains(&ClientAction::ConnectionChanged { state: ConnectionState::Closed }));
    assert!(actions.contains(&ClientAction::PresenceChanged { room_id: room_id.clone() }));
    assert_eq!(client.connection_state(), None);
    assert_eq!(client.selected_room(), None);

    assert!(client.handle(echo("m1", "bob", "late", None)).unwrap().is_empty());
    assert_eq!(client.sequence_for(&room_id).count(), 0);

    assert!(client.handle(ClientEvent::Close).unwrap().is_empty());
}

#[test]
fn transport_failure_without_policy_is_terminal() {
    let (mut client, env) = client_with(ClientConfig::default());
    client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap();

    let actions =
        client.handle(ClientEvent::TransportFailed { reason: "refused".into() }).unwrap();
    assert_eq!(actions, vec![ClientAction::ConnectionChanged { state: ConnectionState::Errored }]);

    let now = env.advance(Duration::from_secs(120));
    let actions = client.handle(ClientEvent::Tick { now }).unwrap();
    assert!(!actions.iter().any(|a| matches!(a, ClientAction::Connect { .. })));

    // Re-entering the workspace retries.
    let actions = client.handle(ClientEvent::Open { workspace_id: workspace() }).unwrap();
    assert!(matches!(actions.first(), Some(ClientAction::Connect { .. })));
}

#[test]
fn reconnect_with_backoff_rejoins_selected_room() {
    let config = ClientConfig {
        reconnect: RetryPolicy::Backoff {
            max_attempts: 2,
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
        },
        ..ClientConfig::default()
    };
    let (mut client, env) = open_in_general(config);

    let actions = client.handle(ClientEvent::TransportFailed { reason: "reset".into() }).unwrap();
    assert_eq!(actions, vec![ClientAction::ConnectionChanged { state: ConnectionState::Closed }]);

    let now = env.advance(Duration::from_millis(500));
    assert!(client.handle(ClientEvent::Tick { now }).unwrap().is_empty());

    let now = env.advance(Duration::from_millis(500));
    let actions = client.handle(ClientEvent::Tick { now }).unwrap();
    assert!(actions.contains(&ClientAction::Connect { workspace_id: workspace() }));

    client.handle(ClientEvent::TransportConnected).unwrap();
    let actions = client.handle(frame(Payload::HelloReply(HelloReply { session_id: 10 }))).unwrap();
    assert_eq!(count(&actions, Opcode::JoinGroup), 1);
}

#[test]
fn failed_send_stays_visible_without_resend_policy() {
    let (mut client, env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    let actions = client
        .handle(ClientEvent::SendMessage { room_id: room_id.clone(), body: "lost".into() })
        .unwrap();
    let Some(ClientAction::Send(send_frame)) = actions.first().cloned() else {
        panic!("expected sendMessage frame");
    };

    client.handle(ClientEvent::SendFailed { frame: send_frame, reason: "reset".into() }).unwrap();

    let states: Vec<_> = client.sequence_for(&room_id).map(|m| m.state).collect();
    assert_eq!(states, vec![MessageState::Failed { attempts: 1 }]);

    let now = env.advance(Duration::from_secs(60));
    assert_eq!(count(&client.handle(ClientEvent::Tick { now }).unwrap(), Opcode::SendMessage), 0);
}

#[test]
fn failed_send_resent_with_same_token() {
    let config = ClientConfig { resend: RetryPolicy::backoff(3), ..ClientConfig::default() };
    let (mut client, env) = open_in_general(config);
    let room_id = general().id;

    let actions = client
        .handle(ClientEvent::SendMessage { room_id: room_id.clone(), body: "retry me".into() })
        .unwrap();
    let Some(ClientAction::Send(send_frame)) = actions.first().cloned() else {
        panic!("expected sendMessage frame");
    };

    client
        .handle(ClientEvent::SendFailed { frame: send_frame.clone(), reason: "reset".into() })
        .unwrap();

    let now = env.advance(Duration::from_secs(1));
    let actions = client.handle(ClientEvent::Tick { now }).unwrap();
    assert!(actions.contains(&ClientAction::Send(send_frame)));

    let states: Vec<_> = client.sequence_for(&room_id).map(|m| m.state).collect();
    assert_eq!(states, vec![MessageState::Provisional]);
}

#[test]
fn seeded_history_precedes_live_messages() {
    let (mut client, _env) = open_in_general(ClientConfig::default());
    let room_id = general().id;

    client.handle(echo("m3", "bob", "live", None)).unwrap();

    let history = ["m1", "m2"]
        .into_iter()
        .map(|id| huddle_client::ConfirmedMessage {
            id: id.to_string(),
            room_id: room_id.clone(),
            sender: Identity::new(UserId::new("bob").unwrap(), "Bob"),
            body: format!("old {id}"),
            created_at: 0,
            client_token: None,
        })
        .collect();
    let actions = client.handle(ClientEvent::SeedHistory { room_id: room_id.clone(), messages: history }).unwrap();
    assert_eq!(actions, vec![ClientAction::MessagesChanged { room_id: room_id.clone() }]);

    let bodies: Vec<_> = client.sequence_for(&room_id).map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["old m1", "old m2", "live"]);
}

#[test]
fn idle_connection_times_out() {
    let (mut client, env) = open_in_general(ClientConfig::default());

    let now = env.advance(Duration::from_secs(61));
    let actions = client.handle(ClientEvent::Tick { now }).unwrap();

    assert!(actions.contains(&ClientAction::Disconnect));
    assert!(actions.contains(&ClientAction::ConnectionChanged { state: ConnectionState::Closed }));
    assert_eq!(client.connection_state(), Some(ConnectionState::Closed));
}

#[test]
fn dropped_unknown_opcode() {
    let (mut client, _env) = open_in_general(ClientConfig::default());

    let mut bytes = FrameHeader::new(Opcode::Ping).to_bytes();
    bytes[6..8].copy_from_slice(&0x0999u16.to_be_bytes());
    let unknown = Frame::decode(&bytes).unwrap();

    assert!(client.handle(ClientEvent::FrameReceived(unknown)).unwrap().is_empty());
    assert_eq!(client.connection_state(), Some(ConnectionState::Open));
}
