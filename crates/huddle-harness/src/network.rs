//! In-memory network between simulated clients and the reference server.
//!
//! Each session gets an inbox. Frames sent by a client are handed to the
//! server immediately and its deliveries are queued in the target inboxes,
//! preserving server order per session.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use huddle_proto::Frame;
use thiserror::Error;
use tracing::debug;

use crate::SimServer;

/// Network-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The connection attempt was refused.
    #[error("connection refused")]
    Refused,

    /// The session is no longer connected.
    #[error("session {0} is not connected")]
    NotConnected(u64),
}

/// Server plus per-session inboxes.
#[derive(Debug, Default)]
pub struct SimNetwork {
    server: SimServer,
    inboxes: HashMap<u64, VecDeque<Frame>>,
    /// Connection attempts still to be refused.
    refuse: u32,
}

/// Network shared between several drivers.
pub type SharedNetwork = Arc<Mutex<SimNetwork>>;

impl SimNetwork {
    /// Create a network in front of `server`.
    pub fn new(server: SimServer) -> Self {
        Self { server, inboxes: HashMap::new(), refuse: 0 }
    }

    /// Wrap into a [`SharedNetwork`].
    pub fn shared(self) -> SharedNetwork {
        Arc::new(Mutex::new(self))
    }

    /// The reference server.
    pub fn server(&self) -> &SimServer {
        &self.server
    }

    /// Mutable access to the reference server.
    pub fn server_mut(&mut self) -> &mut SimServer {
        &mut self.server
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&mut self, count: u32) {
        self.refuse = count;
    }

    /// Open a session.
    ///
    /// # Errors
    ///
    /// [`NetworkError::Refused`] while refusals are pending.
    pub fn connect(&mut self) -> Result<u64, NetworkError> {
        if self.refuse > 0 {
            self.refuse -= 1;
            debug!(remaining = self.refuse, "refusing connection");
            return Err(NetworkError::Refused);
        }

        let session = self.server.connect();
        self.inboxes.insert(session, VecDeque::new());
        Ok(session)
    }

    /// Close a session from the client side. Undelivered frames are lost.
    pub fn disconnect(&mut self, session: u64) {
        self.inboxes.remove(&session);
        self.server.disconnect(session);
    }

    /// Whether `session` is connected.
    pub fn is_connected(&self, session: u64) -> bool {
        self.inboxes.contains_key(&session)
    }

    /// Send a frame from `session` to the server.
    ///
    /// # Errors
    ///
    /// [`NetworkError::NotConnected`] if the session is gone.
    pub fn send(&mut self, session: u64, frame: &Frame) -> Result<(), NetworkError> {
        if !self.is_connected(session) {
            return Err(NetworkError::NotConnected(session));
        }

        for delivery in self.server.handle_frame(session, frame) {
            if let Some(inbox) = self.inboxes.get_mut(&delivery.session) {
                inbox.push_back(delivery.frame);
            }
        }

        if !self.server.is_connected(session) {
            self.inboxes.remove(&session);
        }
        Ok(())
    }

    /// Next frame queued for `session`.
    pub fn recv(&mut self, session: u64) -> Option<Frame> {
        self.inboxes.get_mut(&session)?.pop_front()
    }

    /// Whether any session has frames waiting.
    pub fn has_pending(&self) -> bool {
        self.inboxes.values().any(|inbox| !inbox.is_empty())
    }

    /// Queue a raw frame for `session`, bypassing the server.
    pub fn inject(&mut self, session: u64, frame: Frame) {
        if let Some(inbox) = self.inboxes.get_mut(&session) {
            inbox.push_back(frame);
        }
    }
}
