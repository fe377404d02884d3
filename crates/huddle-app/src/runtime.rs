//! Generic runtime for client orchestration.
//!
//! The Runtime drives the event loop, coordinating between:
//! - [`Client`]: messaging state machine
//! - [`Driver`]: platform-specific I/O
//!
//! Every client event, whether it comes from the view, the transport or the
//! clock, goes through one queue, so the client sees a single ordered stream.

use std::collections::VecDeque;

use huddle_client::{Client, ClientAction, ClientEvent};
use huddle_core::Environment;
use tracing::{debug, warn};

use crate::{Driver, ViewUpdate};

/// Generic runtime that orchestrates a [`Client`] and a [`Driver`].
///
/// # Type Parameters
///
/// - `D`: Platform-specific I/O driver
/// - `E`: Environment for time and randomness
pub struct Runtime<D, E>
where
    D: Driver,
    E: Environment,
{
    driver: D,
    client: Client<E>,

    /// Whether a transport was opened and not yet torn down.
    transport_up: bool,

    /// Follow-up events produced while executing actions.
    pending: VecDeque<ClientEvent<E::Instant>>,
}

impl<D, E> Runtime<D, E>
where
    D: Driver<Instant = E::Instant>,
    E: Environment,
{
    /// Create a runtime around `client`, performing I/O through `driver`.
    pub fn new(driver: D, client: Client<E>) -> Self {
        Self { driver, client, transport_up: false, pending: VecDeque::new() }
    }

    /// Run the main event loop until the driver yields [`Intent::Quit`].
    ///
    /// Opens the client's workspace first and closes it on exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to poll input or render.
    /// Transport errors are fed back to the client instead.
    ///
    /// [`Intent::Quit`]: crate::Intent::Quit
    pub async fn run(mut self) -> Result<(), D::Error> {
        self.start().await?;

        while !self.step().await? {}

        self.shutdown().await
    }

    /// Open the client's workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering the resulting state fails.
    pub async fn start(&mut self) -> Result<(), D::Error> {
        let workspace_id = self.client.workspace_id().clone();
        self.dispatch(ClientEvent::Open { workspace_id }).await
    }

    /// Process one cycle of the event loop:
    /// 1. Poll one intent from the driver
    /// 2. Drain frames received from the server and late send failures
    /// 3. Tick the client with the driver's clock
    ///
    /// Returns `true` if the runtime should stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver fails to poll input or render.
    pub async fn step(&mut self) -> Result<bool, D::Error> {
        if let Some(intent) = self.driver.poll_intent().await? {
            match intent.into_event(self.client.workspace_id()) {
                Some(event) => self.dispatch(event).await?,
                None => return Ok(true),
            }
        }

        if self.transport_up {
            while let Some(frame) = self.driver.recv_frame().await {
                self.dispatch(ClientEvent::FrameReceived(frame)).await?;
                if !self.transport_up {
                    break;
                }
            }

            while self.transport_up
                && let Some((frame, reason)) = self.driver.poll_send_failure()
            {
                self.dispatch(ClientEvent::SendFailed { frame, reason }).await?;
            }

            if self.transport_up && !self.driver.is_connected() {
                self.transport_up = false;
                self.dispatch(ClientEvent::TransportFailed { reason: "transport closed".into() })
                    .await?;
            }
        }

        let now = self.driver.now();
        self.dispatch(ClientEvent::Tick { now }).await?;

        Ok(false)
    }

    /// Close the workspace and tear down the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering the final state fails.
    pub async fn shutdown(&mut self) -> Result<(), D::Error> {
        self.dispatch(ClientEvent::Close).await?;
        self.driver.disconnect();
        self.transport_up = false;
        Ok(())
    }

    /// Feed `event` and every follow-up event it causes to the client.
    async fn dispatch(&mut self, event: ClientEvent<E::Instant>) -> Result<(), D::Error> {
        self.pending.push_back(event);

        while let Some(event) = self.pending.pop_front() {
            let actions = match self.client.handle(event) {
                Ok(actions) => actions,
                Err(error) => {
                    warn!(%error, "client rejected event");
                    continue;
                },
            };

            for action in actions {
                self.execute(action).await?;
            }
        }

        Ok(())
    }

    async fn execute(&mut self, action: ClientAction) -> Result<(), D::Error> {
        match action {
            ClientAction::Connect { workspace_id } => {
                match self.driver.connect(&workspace_id).await {
                    Ok(()) => {
                        debug!(workspace = %workspace_id, "transport connected");
                        self.transport_up = true;
                        self.pending.push_back(ClientEvent::TransportConnected);
                    },
                    Err(error) => {
                        warn!(workspace = %workspace_id, %error, "connect failed");
                        self.pending
                            .push_back(ClientEvent::TransportFailed { reason: error.to_string() });
                    },
                }
            },
            ClientAction::Send(frame) => {
                if let Err(error) = self.driver.send_frame(frame.clone()).await {
                    warn!(%error, "send failed");
                    self.pending.push_back(ClientEvent::SendFailed { frame, reason: error.to_string() });
                }
            },
            ClientAction::Disconnect => {
                self.transport_up = false;
                self.driver.disconnect();
            },
            ClientAction::ConnectionChanged { state } => {
                self.driver.render(&self.client, &ViewUpdate::Connection(state))?;
            },
            ClientAction::MessagesChanged { room_id } => {
                self.driver.render(&self.client, &ViewUpdate::Messages(room_id))?;
            },
            ClientAction::PresenceChanged { room_id } => {
                self.driver.render(&self.client, &ViewUpdate::Presence(room_id))?;
            },
        }

        Ok(())
    }

    /// The client being driven.
    pub fn client(&self) -> &Client<E> {
        &self.client
    }

    /// The driver performing I/O.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable access to the driver.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}
