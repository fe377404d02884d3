//! Multi-client simulation world.
//!
//! `SimWorld` owns several clients, one [`SimNetwork`] and a shared
//! [`SimEnv`]. Client actions are executed synchronously: connects open a
//! network session, sends reach the server immediately, and server output
//! waits in per-session inboxes until [`SimWorld::deliver`] hands it to the
//! clients. Tests control interleavings by choosing when to deliver and when
//! to advance the clock.

use std::{collections::VecDeque, time::Duration};

use huddle_client::{Client, ClientAction, ClientConfig, ClientError, ClientEvent};
use huddle_core::{Environment, Identity, Room, RoomId, UserId, WorkspaceId};
use huddle_proto::{Frame, Opcode};
use tracing::debug;

use crate::{
    ClientSnapshot, InvariantRegistry, NetworkError, SimEnv, SimInstant, SimNetwork, SimServer,
    SystemSnapshot,
};

/// Index of a client within a [`SimWorld`].
pub type ClientId = usize;

struct SimClient {
    client: Client<SimEnv>,
    session: Option<u64>,
    /// Every frame this client sent, in order.
    sent: Vec<Frame>,
}

/// Deterministic multi-client simulation.
pub struct SimWorld {
    env: SimEnv,
    network: SimNetwork,
    workspace_id: WorkspaceId,
    clients: Vec<SimClient>,
    invariants: InvariantRegistry,
}

impl SimWorld {
    /// Create a world for `workspace` in front of `server`.
    ///
    /// # Panics
    ///
    /// Panics if `workspace` is blank.
    #[allow(clippy::expect_used)]
    pub fn new(seed: u64, workspace: &str, server: SimServer) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            network: SimNetwork::new(server),
            workspace_id: WorkspaceId::new(workspace).expect("simulation workspace id"),
            clients: Vec::new(),
            invariants: InvariantRegistry::standard(),
        }
    }

    /// Add a client for `user` (shown as `name`).
    ///
    /// # Panics
    ///
    /// Panics if `user` is blank.
    #[allow(clippy::expect_used)]
    pub fn add_client(&mut self, user: &str, name: &str, config: ClientConfig) -> ClientId {
        let identity = Identity::new(UserId::new(user).expect("simulation user id"), name);
        let client = Client::new(self.env.clone(), identity, self.workspace_id.clone(), config);
        self.clients.push(SimClient { client, session: None, sent: Vec::new() });
        self.clients.len() - 1
    }

    /// A room of this world's workspace owned by the first client.
    ///
    /// # Panics
    ///
    /// Panics if `room` is blank or no client was added yet.
    #[allow(clippy::expect_used)]
    pub fn room(&self, room: &str) -> Room {
        let owner = self.clients.first().expect("at least one client").client.identity();
        Room::new(
            RoomId::new(room).expect("simulation room id"),
            self.workspace_id.clone(),
            room,
            owner.user_id.clone(),
        )
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Current virtual time.
    pub fn now(&self) -> SimInstant {
        self.env.now()
    }

    /// The client with index `id`.
    pub fn client(&self, id: ClientId) -> &Client<SimEnv> {
        &self.clients[id].client
    }

    /// Frames sent by client `id`, in order.
    pub fn sent(&self, id: ClientId) -> &[Frame] {
        &self.clients[id].sent
    }

    /// Number of frames with `opcode` sent by client `id`.
    pub fn sent_count(&self, id: ClientId, opcode: Opcode) -> usize {
        self.clients[id].sent.iter().filter(|f| f.opcode() == Some(opcode)).count()
    }

    /// The reference server.
    pub fn server(&self) -> &SimServer {
        self.network.server()
    }

    /// The network, for fault injection.
    pub fn network_mut(&mut self) -> &mut SimNetwork {
        &mut self.network
    }

    /// Apply `event` to client `id`, then every follow-up event its actions
    /// cause. Server output stays queued until [`Self::deliver`].
    ///
    /// # Errors
    ///
    /// Returns the first error the client reports.
    pub fn handle(
        &mut self,
        id: ClientId,
        event: ClientEvent<SimInstant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let mut queue = VecDeque::from([event]);
        let mut all = Vec::new();

        while let Some(event) = queue.pop_front() {
            let actions = self.clients[id].client.handle(event)?;
            for action in &actions {
                self.execute(id, action, &mut queue);
            }
            all.extend(actions);
        }

        Ok(all)
    }

    fn execute(
        &mut self,
        id: ClientId,
        action: &ClientAction,
        queue: &mut VecDeque<ClientEvent<SimInstant>>,
    ) {
        let sim = &mut self.clients[id];
        match action {
            ClientAction::Connect { .. } => match self.network.connect() {
                Ok(session) => {
                    sim.session = Some(session);
                    queue.push_back(ClientEvent::TransportConnected);
                },
                Err(error) => {
                    queue.push_back(ClientEvent::TransportFailed { reason: error.to_string() });
                },
            },
            ClientAction::Send(frame) => {
                sim.sent.push(frame.clone());
                let result = match sim.session {
                    Some(session) => self.network.send(session, frame),
                    None => Err(NetworkError::NotConnected(0)),
                };
                if let Err(error) = result {
                    queue.push_back(ClientEvent::SendFailed {
                        frame: frame.clone(),
                        reason: error.to_string(),
                    });
                }
            },
            ClientAction::Disconnect => {
                if let Some(session) = sim.session.take() {
                    self.network.disconnect(session);
                }
            },
            ClientAction::ConnectionChanged { .. }
            | ClientAction::MessagesChanged { .. }
            | ClientAction::PresenceChanged { .. } => {},
        }
    }

    /// Deliver queued server output to every client until the network is
    /// quiet. Returns the number of frames delivered.
    ///
    /// # Errors
    ///
    /// Returns the first error a client reports.
    pub fn deliver(&mut self) -> Result<usize, ClientError> {
        let mut delivered = 0;

        while self.network.has_pending() {
            let before = delivered;
            for id in 0..self.clients.len() {
                let Some(session) = self.clients[id].session else {
                    continue;
                };
                while let Some(frame) = self.network.recv(session) {
                    delivered += 1;
                    self.handle(id, ClientEvent::FrameReceived(frame))?;
                }
            }
            if delivered == before {
                break;
            }
        }

        debug!(delivered, "network drained");
        Ok(delivered)
    }

    /// Open client `id` and complete the handshake.
    ///
    /// # Errors
    ///
    /// Returns the first error a client reports.
    pub fn open(&mut self, id: ClientId) -> Result<(), ClientError> {
        let workspace_id = self.workspace_id.clone();
        self.handle(id, ClientEvent::Open { workspace_id })?;
        self.deliver()?;
        Ok(())
    }

    /// Select `room` on client `id` and deliver.
    ///
    /// # Errors
    ///
    /// Returns the first error a client reports.
    pub fn select(&mut self, id: ClientId, room: &Room) -> Result<(), ClientError> {
        self.handle(id, ClientEvent::SelectRoom(room.clone()))?;
        self.deliver()?;
        Ok(())
    }

    /// Send `body` from client `id` without delivering the echo.
    ///
    /// # Errors
    ///
    /// Returns the first error a client reports.
    pub fn send(&mut self, id: ClientId, room_id: &RoomId, body: &str) -> Result<(), ClientError> {
        self.handle(id, ClientEvent::SendMessage { room_id: room_id.clone(), body: body.into() })?;
        Ok(())
    }

    /// Keystroke in client `id`'s composer, without delivering.
    ///
    /// # Errors
    ///
    /// Returns the first error a client reports.
    pub fn keystroke(&mut self, id: ClientId, room_id: &RoomId) -> Result<(), ClientError> {
        self.handle(id, ClientEvent::Keystroke { room_id: room_id.clone() })?;
        Ok(())
    }

    /// Advance the clock, tick every client, then deliver.
    ///
    /// # Errors
    ///
    /// Returns the first error a client reports.
    pub fn advance(&mut self, by: Duration) -> Result<(), ClientError> {
        let now = self.env.advance(by);
        for id in 0..self.clients.len() {
            self.handle(id, ClientEvent::Tick { now })?;
        }
        self.deliver()?;
        Ok(())
    }

    /// Hand `frame` straight to client `id`, bypassing the server.
    ///
    /// # Errors
    ///
    /// Returns the first error the client reports.
    pub fn inject(&mut self, id: ClientId, frame: Frame) -> Result<Vec<ClientAction>, ClientError> {
        self.handle(id, ClientEvent::FrameReceived(frame))
    }

    /// Kill client `id`'s transport as if the network dropped it.
    ///
    /// # Errors
    ///
    /// Returns the first error the client reports.
    pub fn sever(&mut self, id: ClientId) -> Result<(), ClientError> {
        if let Some(session) = self.clients[id].session.take() {
            self.network.disconnect(session);
        }
        self.handle(id, ClientEvent::TransportFailed { reason: "severed".into() })?;
        Ok(())
    }

    /// Snapshot of every client.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_clients(
            self.clients
                .iter()
                .enumerate()
                .map(|(id, sim)| ClientSnapshot::capture(id, &sim.client))
                .collect(),
        )
    }

    /// Assert the standard invariants.
    ///
    /// # Panics
    ///
    /// Panics on any violation.
    pub fn check_invariants(&self, context: &str) {
        self.invariants.assert_all(&self.snapshot(), context);
    }
}
