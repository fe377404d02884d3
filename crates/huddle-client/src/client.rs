//! Client state machine.
//!
//! The `Client` is the workspace-scoped context that owns the connection and
//! every piece of per-room messaging state. All inputs arrive through
//! [`Client::handle`] and are applied in call order, which is what keeps
//! reconciliation and presence consistent with the server's event stream.

use std::time::Duration;

use huddle_core::{
    Connection, ConnectionAction, ConnectionState, Environment, Identity, InvalidId, Room, RoomId,
    UserId, WorkspaceId,
};
use huddle_proto::{
    Frame, Payload,
    payloads::{
        chat::{ChatMessage, JoinGroup, SendMessage, Sender},
        presence::{StopTyping, Typing, UserStoppedTyping, UserTyping},
    },
};
use tracing::{debug, info, warn};

use crate::{
    composer::{Composer, ComposerSignal},
    config::ClientConfig,
    error::ClientError,
    event::{ClientAction, ClientEvent},
    membership::RoomMembership,
    presence::{TypingPresence, TypingSummary, TypingTrigger},
    store::{ConfirmedMessage, LocalToken, Message, MessageStore, Reconciled},
};

/// Reconnect waiting for its backoff delay.
#[derive(Debug)]
struct PendingReconnect<I> {
    since: I,
    delay: Duration,
}

/// Failed send waiting for its backoff delay.
#[derive(Debug)]
struct PendingResend<I> {
    room_id: RoomId,
    token: LocalToken,
    frame: Frame,
    since: I,
    delay: Duration,
}

/// Group-messaging client for one workspace.
pub struct Client<E: Environment> {
    /// Environment for time and randomness.
    env: E,

    /// Local user.
    identity: Identity,

    /// Workspace this client is scoped to.
    workspace_id: WorkspaceId,

    config: ClientConfig,

    /// At most one connection, live or terminal.
    connection: Option<Connection<E::Instant>>,

    membership: RoomMembership,
    store: MessageStore,
    presence: TypingPresence<E::Instant>,
    composer: Composer<E::Instant>,

    /// Consecutive connections that ended without a local close.
    reconnect_attempts: u32,
    pending_reconnect: Option<PendingReconnect<E::Instant>>,
    pending_resends: Vec<PendingResend<E::Instant>>,
}

impl<E: Environment> Client<E> {
    /// Create a client for `workspace_id`. No connection is opened until
    /// [`ClientEvent::Open`].
    pub fn new(env: E, identity: Identity, workspace_id: WorkspaceId, config: ClientConfig) -> Self {
        let session = env.random_u64();

        Self {
            membership: RoomMembership::new(workspace_id.clone()),
            store: MessageStore::new(session),
            presence: TypingPresence::new(identity.user_id.clone(), config.typing_window),
            composer: Composer::new(config.typing_window),
            env,
            identity,
            workspace_id,
            config,
            connection: None,
            reconnect_attempts: 0,
            pending_reconnect: None,
            pending_resends: Vec::new(),
        }
    }

    /// Local user.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Workspace this client is scoped to.
    pub fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// State of the current connection. `None` if none was opened or the
    /// workspace was closed.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection.as_ref().map(Connection::state)
    }

    /// Currently selected room.
    pub fn selected_room(&self) -> Option<&RoomId> {
        self.membership.selected()
    }

    /// Ordered message sequence for `room_id`.
    pub fn sequence_for<'a>(
        &'a self,
        room_id: &RoomId,
    ) -> impl Iterator<Item = &'a Message> + use<'a, E> {
        self.store.sequence_for(room_id)
    }

    /// Typing indicator for `room_id`, or `None` if nobody is typing.
    pub fn typing_summary(&self, room_id: &RoomId) -> Option<TypingSummary> {
        self.presence.summary(room_id, self.env.now())
    }

    /// Whether `user_id` is currently shown as typing in `room_id`.
    pub fn is_typing(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        self.presence.is_typing(room_id, user_id, self.env.now())
    }

    /// Message store, for inspection.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Process an event and return resulting actions.
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Open { workspace_id } => self.handle_open(workspace_id),
            ClientEvent::Close => Ok(self.handle_close()),
            ClientEvent::TransportConnected => self.handle_transport_connected(),
            ClientEvent::TransportFailed { reason } => Ok(self.handle_transport_failed(&reason)),
            ClientEvent::FrameReceived(frame) => self.handle_frame(&frame),
            ClientEvent::SendFailed { frame, reason } => Ok(self.handle_send_failed(frame, &reason)),
            ClientEvent::SelectRoom(room) => self.handle_select_room(&room),
            ClientEvent::SendMessage { room_id, body } => self.handle_send_message(&room_id, &body),
            ClientEvent::Keystroke { room_id } => self.handle_keystroke(&room_id),
            ClientEvent::SeedHistory { room_id, messages } => {
                Ok(self.handle_seed_history(&room_id, messages))
            },
            ClientEvent::Tick { now } => self.handle_tick(now),
        }
    }

    fn is_open(&self) -> bool {
        self.connection_state() == Some(ConnectionState::Open)
    }

    fn is_live(&self) -> bool {
        self.connection_state().is_some_and(ConnectionState::is_live)
    }

    fn handle_open(&mut self, workspace_id: WorkspaceId) -> Result<Vec<ClientAction>, ClientError> {
        if workspace_id != self.workspace_id {
            return Err(ClientError::WorkspaceMismatch {
                expected: self.workspace_id.clone(),
                actual: workspace_id,
            });
        }

        if self.is_live() {
            debug!(workspace = %self.workspace_id, "open ignored: connection already live");
            return Ok(Vec::new());
        }

        self.reconnect_attempts = 0;
        self.pending_reconnect = None;
        Ok(self.start_connection(self.env.now()))
    }

    fn start_connection(&mut self, now: E::Instant) -> Vec<ClientAction> {
        info!(workspace = %self.workspace_id, "connecting");
        self.connection =
            Some(Connection::new(self.workspace_id.clone(), now, self.config.connection.clone()));

        vec![
            ClientAction::Connect { workspace_id: self.workspace_id.clone() },
            ClientAction::ConnectionChanged { state: ConnectionState::Connecting },
        ]
    }

    fn handle_close(&mut self) -> Vec<ClientAction> {
        self.pending_reconnect = None;
        self.pending_resends.clear();
        self.membership.release();
        self.composer.reset();

        let mut actions = Vec::new();
        if let Some(mut connection) = self.connection.take() {
            let previous = connection.state();
            connection.close();

            if previous.is_live() {
                actions.push(ClientAction::Disconnect);
            }
            if previous != ConnectionState::Closed {
                actions.push(ClientAction::ConnectionChanged { state: ConnectionState::Closed });
            }
            info!(workspace = %self.workspace_id, "workspace closed");
        }

        actions.extend(presence_changed(self.presence.clear()));
        actions
    }

    fn handle_transport_connected(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let Some(connection) =
            self.connection.as_mut().filter(|c| c.state() == ConnectionState::Connecting)
        else {
            debug!("transport connected with no connection awaiting it");
            return Ok(Vec::new());
        };

        let actions = connection.send_hello(&self.identity, now)?;
        Ok(connection_actions(actions))
    }

    fn handle_transport_failed(&mut self, reason: &str) -> Vec<ClientAction> {
        let Some(connection) = self.connection.as_mut().filter(|c| c.state().is_live()) else {
            debug!(reason, "transport failure for a connection that is already down");
            return Vec::new();
        };

        warn!(workspace = %self.workspace_id, reason, "transport failed");
        connection.fail(reason);
        self.on_connection_lost(self.env.now())
    }

    /// Reset per-connection state after the connection reached a terminal
    /// state without a local close, and schedule a reconnect if allowed.
    fn on_connection_lost(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let state = self.connection_state().unwrap_or(ConnectionState::Closed);

        self.membership.reset_joins();
        self.composer.reset();
        self.pending_resends.clear();

        let mut actions = vec![ClientAction::ConnectionChanged { state }];
        actions.extend(presence_changed(self.presence.drop_typists()));

        self.reconnect_attempts += 1;
        match self.config.reconnect.delay_for(self.reconnect_attempts) {
            Some(delay) => {
                info!(attempt = self.reconnect_attempts, ?delay, "reconnect scheduled");
                self.pending_reconnect = Some(PendingReconnect { since: now, delay });
            },
            None => {
                info!(attempts = self.reconnect_attempts - 1, "not reconnecting");
            },
        }

        actions
    }

    /// Follow-up actions for a connection state change.
    fn on_transition(
        &mut self,
        before: ConnectionState,
        after: ConnectionState,
        now: E::Instant,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if before == after {
            return Ok(Vec::new());
        }

        match after {
            ConnectionState::Open => {
                self.reconnect_attempts = 0;
                let mut actions = vec![ClientAction::ConnectionChanged { state: after }];
                if let Some(room_id) = self.membership.on_open() {
                    debug!(room = %room_id, "joining deferred room");
                    actions.push(ClientAction::Send(join_frame(&room_id)?));
                }
                Ok(actions)
            },
            ConnectionState::Errored | ConnectionState::Closed => Ok(self.on_connection_lost(now)),
            ConnectionState::Connecting => Ok(Vec::new()),
        }
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let now = self.env.now();
        let Some(connection) = self.connection.as_mut().filter(|c| c.state().is_live()) else {
            debug!(opcode = frame.header.opcode(), "dropping frame: no live connection");
            return Ok(Vec::new());
        };
        connection.update_activity(now);

        let Some(opcode) = frame.opcode() else {
            warn!(opcode = frame.header.opcode(), "dropping frame with unknown opcode");
            return Ok(Vec::new());
        };

        if opcode.is_session() {
            let before = connection.state();
            let result = connection.handle_frame(frame, now);
            let after = connection.state();

            let mut actions = match result {
                Ok(actions) => connection_actions(actions),
                Err(error) => {
                    warn!(%opcode, %error, "dropping session frame");
                    Vec::new()
                },
            };
            actions.extend(self.on_transition(before, after, now)?);
            return Ok(actions);
        }

        if connection.state() != ConnectionState::Open {
            debug!(%opcode, "dropping chat frame received before handshake");
            return Ok(Vec::new());
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%opcode, %error, "dropping malformed event");
                return Ok(Vec::new());
            },
        };

        let actions = match payload {
            Payload::ReceiveMessage(message) => self.on_receive_message(message),
            Payload::UserTyping(typing) => self.on_user_typing(typing, now),
            Payload::UserStoppedTyping(stopped) => self.on_user_stopped_typing(stopped),
            other => {
                warn!(opcode = %other.opcode(), "dropping client-only event sent by server");
                Vec::new()
            },
        };
        Ok(actions)
    }

    fn on_receive_message(&mut self, message: ChatMessage) -> Vec<ClientAction> {
        let confirmed = match ConfirmedMessage::try_from(message) {
            Ok(confirmed) => confirmed,
            Err(error) => {
                warn!(%error, "dropping malformed receiveMessage");
                return Vec::new();
            },
        };

        let room_id = confirmed.room_id.clone();
        match self.store.reconcile(&self.identity.user_id, confirmed) {
            Reconciled::Duplicate => {
                debug!(room = %room_id, "duplicate delivery ignored");
                Vec::new()
            },
            outcome => {
                debug!(room = %room_id, ?outcome, "message confirmed");
                vec![ClientAction::MessagesChanged { room_id }]
            },
        }
    }

    fn on_user_typing(&mut self, typing: UserTyping, now: E::Instant) -> Vec<ClientAction> {
        let (room_id, user_id) = match (RoomId::new(typing.group_id), UserId::new(typing.user_id)) {
            (Ok(room_id), Ok(user_id)) => (room_id, user_id),
            (Err(error), _) | (_, Err(error)) => {
                warn!(%error, "dropping malformed userTyping");
                return Vec::new();
            },
        };

        let trigger =
            TypingTrigger::Start { room_id, user_id, display_name: typing.username, now };
        presence_changed(self.presence.apply(trigger)).collect()
    }

    fn on_user_stopped_typing(&mut self, stopped: UserStoppedTyping) -> Vec<ClientAction> {
        let (room_id, user_id) =
            match (RoomId::new(stopped.group_id), UserId::new(stopped.user_id)) {
                (Ok(room_id), Ok(user_id)) => (room_id, user_id),
                (Err(error), _) | (_, Err(error)) => {
                    warn!(%error, "dropping malformed userStoppedTyping");
                    return Vec::new();
                },
            };

        presence_changed(self.presence.apply(TypingTrigger::Stop { room_id, user_id })).collect()
    }

    fn handle_send_failed(&mut self, frame: Frame, reason: &str) -> Vec<ClientAction> {
        let Ok(Payload::SendMessage(send)) = Payload::from_frame(&frame) else {
            warn!(opcode = frame.header.opcode(), reason, "frame not delivered");
            return Vec::new();
        };

        let token = send.client_token.as_deref().and_then(LocalToken::parse);
        let (Some(token), Ok(room_id)) = (token, RoomId::new(send.group_id)) else {
            warn!(reason, "undelivered sendMessage without a local token");
            return Vec::new();
        };

        let Some(attempts) = self.store.mark_failed(&room_id, token) else {
            debug!(%token, "send failure for a message that is no longer pending");
            return Vec::new();
        };
        warn!(room = %room_id, %token, attempts, reason, "message send failed");

        if self.is_open()
            && let Some(delay) = self.config.resend.delay_for(attempts)
        {
            debug!(%token, ?delay, "resend scheduled");
            self.pending_resends.push(PendingResend {
                room_id: room_id.clone(),
                token,
                frame,
                since: self.env.now(),
                delay,
            });
        }

        vec![ClientAction::MessagesChanged { room_id }]
    }

    fn handle_select_room(&mut self, room: &Room) -> Result<Vec<ClientAction>, ClientError> {
        let switching = self.membership.selected() != Some(&room.id);
        let open = self.is_open();
        let join = self.membership.select(room, open)?;

        let mut actions = Vec::new();
        if switching {
            debug!(room = %room.id, "room selected");
            if let Some(signal) = self.composer.on_room_switch()
                && open
            {
                actions.push(ClientAction::Send(self.signal_frame(signal)?));
            }
            actions.extend(presence_changed(self.presence.select_room(&room.id)));
        }

        if let Some(room_id) = join {
            actions.push(ClientAction::Send(join_frame(&room_id)?));
        }
        Ok(actions)
    }

    fn handle_send_message(
        &mut self,
        room_id: &RoomId,
        body: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if body.trim().is_empty() {
            debug!(room = %room_id, "ignoring empty message");
            return Ok(Vec::new());
        }
        if !self.is_open() {
            debug!(room = %room_id, "send ignored: connection not open");
            return Ok(Vec::new());
        }
        if self.membership.selected() != Some(room_id) {
            debug!(room = %room_id, "send ignored: room not selected");
            return Ok(Vec::new());
        }

        let created_at = self.env.wall_clock_millis();
        let token = self.store.append_provisional(room_id, body, &self.identity, created_at);

        let send = Payload::SendMessage(SendMessage {
            content: body.to_string(),
            project_id: self.workspace_id.as_str().to_string(),
            group_id: room_id.as_str().to_string(),
            sender: Sender {
                id: self.identity.user_id.as_str().to_string(),
                username: self.identity.display_name.clone(),
            },
            created_at,
            client_token: Some(token.to_string()),
        })
        .into_frame()?;

        let signal = self.composer.on_send(room_id);
        let stop = self.signal_frame(signal)?;
        debug!(room = %room_id, %token, "message sent");

        Ok(vec![
            ClientAction::Send(send),
            ClientAction::Send(stop),
            ClientAction::MessagesChanged { room_id: room_id.clone() },
        ])
    }

    fn handle_keystroke(&mut self, room_id: &RoomId) -> Result<Vec<ClientAction>, ClientError> {
        if !self.is_open() || self.membership.selected() != Some(room_id) {
            return Ok(Vec::new());
        }

        let now = self.env.now();
        self.composer
            .on_keystroke(room_id, now)
            .into_iter()
            .map(|signal| self.signal_frame(signal).map(ClientAction::Send))
            .collect()
    }

    fn handle_seed_history(
        &mut self,
        room_id: &RoomId,
        messages: Vec<ConfirmedMessage>,
    ) -> Vec<ClientAction> {
        let inserted = self.store.seed(room_id, messages);
        debug!(room = %room_id, inserted, "history seeded");

        if inserted == 0 {
            return Vec::new();
        }
        vec![ClientAction::MessagesChanged { room_id: room_id.clone() }]
    }

    fn handle_tick(&mut self, now: E::Instant) -> Result<Vec<ClientAction>, ClientError> {
        let mut actions = Vec::new();

        if let Some(connection) = self.connection.as_mut() {
            let before = connection.state();
            let tick_actions = connection.tick(now);
            let after = connection.state();

            actions.extend(connection_actions(tick_actions));
            actions.extend(self.on_transition(before, after, now)?);
        }

        if let Some(signal) = self.composer.tick(now)
            && self.is_open()
        {
            actions.push(ClientAction::Send(self.signal_frame(signal)?));
        }

        actions.extend(presence_changed(self.presence.apply(TypingTrigger::Elapsed { now })));

        if let Some(pending) = &self.pending_reconnect
            && now - pending.since >= pending.delay
        {
            self.pending_reconnect = None;
            if !self.is_live() {
                info!(attempt = self.reconnect_attempts, "reconnecting");
                actions.extend(self.start_connection(now));
            }
        }

        if !self.pending_resends.is_empty() {
            let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_resends)
                .into_iter()
                .partition(|resend| now - resend.since >= resend.delay);
            self.pending_resends = waiting;

            for resend in due {
                if !self.is_open() || !self.store.mark_resent(&resend.room_id, resend.token) {
                    continue;
                }
                debug!(room = %resend.room_id, token = %resend.token, "resending message");
                actions.push(ClientAction::Send(resend.frame));
                actions.push(ClientAction::MessagesChanged { room_id: resend.room_id });
            }
        }

        Ok(actions)
    }

    fn signal_frame(&self, signal: ComposerSignal) -> Result<Frame, ClientError> {
        let user_id = self.identity.user_id.as_str().to_string();
        let payload = match signal {
            ComposerSignal::Start(room_id) => Payload::Typing(Typing {
                group_id: room_id.as_str().to_string(),
                user_id,
                username: self.identity.display_name.clone(),
            }),
            ComposerSignal::Stop(room_id) => {
                Payload::StopTyping(StopTyping { group_id: room_id.as_str().to_string(), user_id })
            },
        };
        Ok(payload.into_frame()?)
    }
}

impl TryFrom<ChatMessage> for ConfirmedMessage {
    type Error = InvalidId;

    fn try_from(message: ChatMessage) -> Result<Self, Self::Error> {
        if message.id.trim().is_empty() {
            return Err(InvalidId { kind: "message" });
        }

        Ok(Self {
            room_id: RoomId::new(message.group_id)?,
            sender: Identity::new(UserId::new(message.sender.id)?, message.sender.username),
            client_token: message.client_token.as_deref().and_then(LocalToken::parse),
            id: message.id,
            body: message.content,
            created_at: message.created_at,
        })
    }
}

fn join_frame(room_id: &RoomId) -> Result<Frame, ClientError> {
    Ok(Payload::JoinGroup(JoinGroup { group_id: room_id.as_str().to_string() }).into_frame()?)
}

fn connection_actions(actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
    actions
        .into_iter()
        .map(|action| match action {
            ConnectionAction::SendFrame(frame) => ClientAction::Send(frame),
            ConnectionAction::Close { reason } => {
                info!(reason, "closing transport");
                ClientAction::Disconnect
            },
        })
        .collect()
}

fn presence_changed(rooms: Vec<RoomId>) -> impl Iterator<Item = ClientAction> {
    rooms.into_iter().map(|room_id| ClientAction::PresenceChanged { room_id })
}
