//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the CLI driver but routes
//! frames through a [`SharedNetwork`] and takes time from a [`SimEnv`]. It
//! implements [`Driver`] so the same [`huddle_app::Runtime`] orchestration
//! code runs in both production and simulation.

use std::{
    collections::VecDeque,
    sync::{MutexGuard, PoisonError},
};

use huddle_app::{Driver, Intent, ViewUpdate};
use huddle_client::Client;
use huddle_core::{Environment, WorkspaceId};
use huddle_proto::Frame;
use thiserror::Error;

use crate::{NetworkError, SharedNetwork, SimEnv, SimInstant, SimNetwork};

/// Error type for simulation driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimDriverError {
    /// Transport-level failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// No transport is open.
    #[error("not connected")]
    NotConnected,
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    network: SharedNetwork,
    env: SimEnv,
    session: Option<u64>,
    intents: VecDeque<Intent>,
    renders: Vec<ViewUpdate>,
}

impl SimDriver {
    /// Create a driver attached to `network`, reading time from `env`.
    pub fn new(network: SharedNetwork, env: SimEnv) -> Self {
        Self { network, env, session: None, intents: VecDeque::new(), renders: Vec::new() }
    }

    /// Queue an intent for the runtime to poll.
    pub fn push_intent(&mut self, intent: Intent) {
        self.intents.push_back(intent);
    }

    /// Session of the open transport, if any.
    pub fn session(&self) -> Option<u64> {
        self.session
    }

    /// Take every view update rendered so far.
    pub fn take_renders(&mut self) -> Vec<ViewUpdate> {
        std::mem::take(&mut self.renders)
    }

    fn network(&self) -> MutexGuard<'_, SimNetwork> {
        self.network.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;
    type Instant = SimInstant;

    async fn poll_intent(&mut self) -> Result<Option<Intent>, Self::Error> {
        Ok(self.intents.pop_front())
    }

    async fn connect(&mut self, _workspace_id: &WorkspaceId) -> Result<(), Self::Error> {
        let session = self.network().connect()?;
        self.session = Some(session);
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let session = self.session.ok_or(SimDriverError::NotConnected)?;
        self.network().send(session, &frame)?;
        Ok(())
    }

    async fn recv_frame(&mut self) -> Option<Frame> {
        let session = self.session?;
        self.network().recv(session)
    }

    fn is_connected(&self) -> bool {
        self.session.is_some_and(|session| self.network().is_connected(session))
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            self.network().disconnect(session);
        }
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render<E: Environment<Instant = SimInstant>>(
        &mut self,
        _client: &Client<E>,
        update: &ViewUpdate,
    ) -> Result<(), Self::Error> {
        self.renders.push(update.clone());
        Ok(())
    }
}
