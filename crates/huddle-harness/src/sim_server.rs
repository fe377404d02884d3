//! In-memory reference server.
//!
//! `SimServer` implements the server side of the group-messaging protocol
//! closely enough to exercise the client: handshake, group joins, message
//! broadcast with server-assigned ids, typing relay and heartbeats. It is
//! synchronous and sans-IO; [`crate::SimNetwork`] moves its output to the
//! right sessions.
//!
//! Fault injection is configured through [`SimServerConfig`].

use std::collections::{BTreeMap, BTreeSet};

use huddle_proto::{
    ErrorPayload, Frame, FrameHeader, Payload,
    payloads::{
        chat::{ChatMessage, SendMessage},
        presence::{StopTyping, Typing, UserStoppedTyping, UserTyping},
        session::{Hello, HelloReply},
    },
};
use tracing::{debug, warn};

/// Server behaviour knobs.
#[derive(Debug, Clone)]
pub struct SimServerConfig {
    /// Echo the sender's `clientToken` on broadcast messages.
    pub echo_client_tokens: bool,

    /// Deliver every broadcast message twice (at-least-once transport).
    pub duplicate_deliveries: bool,
}

impl Default for SimServerConfig {
    fn default() -> Self {
        Self { echo_client_tokens: true, duplicate_deliveries: false }
    }
}

/// A frame addressed to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Destination session.
    pub session: u64,
    /// Frame to deliver.
    pub frame: Frame,
}

#[derive(Debug, Default)]
struct Session {
    /// Set by `hello`.
    user: Option<Hello>,
    groups: BTreeSet<String>,
}

/// Reference server for simulations.
#[derive(Debug)]
pub struct SimServer {
    config: SimServerConfig,
    sessions: BTreeMap<u64, Session>,
    next_session: u64,
    next_message: u64,
    /// Every join request, in arrival order.
    joins: Vec<(u64, String)>,
    /// Every broadcast message, in server order.
    history: Vec<ChatMessage>,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new(SimServerConfig::default())
    }
}

impl SimServer {
    /// Create a server with no sessions.
    pub fn new(config: SimServerConfig) -> Self {
        Self {
            config,
            sessions: BTreeMap::new(),
            next_session: 1,
            next_message: 1,
            joins: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Mutable access to the fault-injection knobs.
    pub fn config_mut(&mut self) -> &mut SimServerConfig {
        &mut self.config
    }

    /// Accept a transport connection. Returns its session id.
    pub fn connect(&mut self) -> u64 {
        let session = self.next_session;
        self.next_session += 1;
        self.sessions.insert(session, Session::default());
        debug!(session, "session accepted");
        session
    }

    /// Drop a session and all its group memberships.
    pub fn disconnect(&mut self, session: u64) {
        if self.sessions.remove(&session).is_some() {
            debug!(session, "session closed");
        }
    }

    /// Whether `session` is still connected.
    pub fn is_connected(&self, session: u64) -> bool {
        self.sessions.contains_key(&session)
    }

    /// Number of join requests seen for `group_id`, across all sessions.
    pub fn join_count(&self, group_id: &str) -> usize {
        self.joins.iter().filter(|(_, g)| g == group_id).count()
    }

    /// Messages broadcast in `group_id`, in server order.
    pub fn history<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a ChatMessage> {
        self.history.iter().filter(move |m| m.group_id == group_id)
    }

    /// Process a frame sent by `session`.
    pub fn handle_frame(&mut self, session: u64, frame: &Frame) -> Vec<Delivery> {
        if !self.sessions.contains_key(&session) {
            warn!(session, "frame from unknown session");
            return Vec::new();
        }

        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(session, %error, "rejecting frame");
                let rejection = ErrorPayload::invalid_payload(error.to_string());
                return reply(session, Payload::Error(rejection));
            },
        };

        match payload {
            Payload::Hello(hello) => self.on_hello(session, hello),
            Payload::Ping => reply(session, Payload::Pong),
            Payload::Pong => Vec::new(),
            Payload::Goodbye(_) => {
                self.disconnect(session);
                Vec::new()
            },
            other if self.user(session).is_none() => {
                warn!(session, opcode = %other.opcode(), "event before hello");
                reply(session, Payload::Error(ErrorPayload::not_authenticated()))
            },
            Payload::JoinGroup(join) => {
                debug!(session, group = %join.group_id, "join");
                if let Some(state) = self.sessions.get_mut(&session) {
                    state.groups.insert(join.group_id.clone());
                }
                self.joins.push((session, join.group_id));
                Vec::new()
            },
            Payload::SendMessage(send) => self.on_send_message(session, send),
            Payload::Typing(typing) => self.on_typing(session, typing),
            Payload::StopTyping(stop) => self.on_stop_typing(session, stop),
            other => {
                warn!(session, opcode = %other.opcode(), "server-only event from client");
                reply(session, Payload::Error(ErrorPayload::frame_rejected("server-only event")))
            },
        }
    }

    fn user(&self, session: u64) -> Option<&Hello> {
        self.sessions.get(&session)?.user.as_ref()
    }

    fn on_hello(&mut self, session: u64, hello: Hello) -> Vec<Delivery> {
        if hello.version != FrameHeader::VERSION {
            return reply(
                session,
                Payload::Error(ErrorPayload::frame_rejected("unsupported protocol version")),
            );
        }

        debug!(session, user = %hello.user_id, project = %hello.project_id, "hello");
        if let Some(state) = self.sessions.get_mut(&session) {
            state.user = Some(hello);
        }
        reply(session, Payload::HelloReply(HelloReply { session_id: session }))
    }

    fn on_send_message(&mut self, session: u64, send: SendMessage) -> Vec<Delivery> {
        let message = ChatMessage {
            id: format!("msg-{}", self.next_message),
            content: send.content,
            group_id: send.group_id,
            sender: send.sender,
            created_at: send.created_at,
            client_token: send.client_token.filter(|_| self.config.echo_client_tokens),
        };
        self.next_message += 1;

        let project = self.user(session).map(|h| h.project_id.clone()).unwrap_or_default();
        let copies = if self.config.duplicate_deliveries { 2 } else { 1 };
        let targets = self.members(&project, &message.group_id, None);
        debug!(
            id = %message.id,
            group = %message.group_id,
            recipients = targets.len(),
            "broadcast"
        );

        let deliveries = broadcast(&targets, &Payload::ReceiveMessage(message.clone()), copies);
        self.history.push(message);
        deliveries
    }

    fn on_typing(&mut self, session: u64, typing: Typing) -> Vec<Delivery> {
        let project = self.user(session).map(|h| h.project_id.clone()).unwrap_or_default();
        let targets = self.members(&project, &typing.group_id, Some(session));
        let event = Payload::UserTyping(UserTyping {
            user_id: typing.user_id,
            group_id: typing.group_id,
            username: typing.username,
        });
        broadcast(&targets, &event, 1)
    }

    fn on_stop_typing(&mut self, session: u64, stop: StopTyping) -> Vec<Delivery> {
        let project = self.user(session).map(|h| h.project_id.clone()).unwrap_or_default();
        let targets = self.members(&project, &stop.group_id, Some(session));
        let event = Payload::UserStoppedTyping(UserStoppedTyping {
            user_id: stop.user_id,
            group_id: stop.group_id,
        });
        broadcast(&targets, &event, 1)
    }

    /// Sessions of `project` that joined `group_id`.
    fn members(&self, project: &str, group_id: &str, exclude: Option<u64>) -> Vec<u64> {
        self.sessions
            .iter()
            .filter(|(id, state)| {
                Some(**id) != exclude
                    && state.groups.contains(group_id)
                    && state.user.as_ref().is_some_and(|h| h.project_id == project)
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

fn encode(payload: Payload) -> Option<Frame> {
    match payload.into_frame() {
        Ok(frame) => Some(frame),
        Err(error) => {
            warn!(%error, "failed to encode server event");
            None
        },
    }
}

fn reply(session: u64, payload: Payload) -> Vec<Delivery> {
    encode(payload).map(|frame| Delivery { session, frame }).into_iter().collect()
}

fn broadcast(sessions: &[u64], payload: &Payload, copies: usize) -> Vec<Delivery> {
    let Some(frame) = encode(payload.clone()) else {
        return Vec::new();
    };

    sessions
        .iter()
        .flat_map(|session| {
            std::iter::repeat_n(Delivery { session: *session, frame: frame.clone() }, copies)
        })
        .collect()
}
