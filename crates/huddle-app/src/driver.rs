//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use huddle_client::Client;
use huddle_core::{ConnectionState, Environment, RoomId, WorkspaceId};
use huddle_proto::Frame;

use crate::Intent;

/// Part of the view that needs to be redrawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// Connection state changed.
    Connection(ConnectionState),

    /// Message sequence of a room changed.
    Messages(RoomId),

    /// Typing indicator of a room changed.
    Presence(RoomId),
}

/// Abstracts I/O operations for the runtime.
///
/// Implementations provide platform-specific I/O while the generic
/// [`Runtime`](crate::Runtime) handles orchestration logic. This ensures
/// the same orchestration code runs in the production CLI and in simulation.
///
/// # Implementations
///
/// - **CLI**: stdin lines for input, QUIC for transport
/// - **Simulation**: in-memory queues routed through a reference server
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Poll for the next view-layer intent.
    ///
    /// Returns `None` if nothing is ready. May wait up to one tick interval.
    fn poll_intent(&mut self) -> impl Future<Output = Result<Option<Intent>, Self::Error>> + Send;

    /// Open a transport to the server hosting `workspace_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established.
    fn connect(
        &mut self,
        workspace_id: &WorkspaceId,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame could not be handed to the transport.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Next frame received from the server, or `None` if none is queued.
    fn recv_frame(&mut self) -> impl Future<Output = Option<Frame>> + Send;

    /// A frame the transport accepted earlier but failed to deliver, with
    /// the reason. Transports that report failures synchronously from
    /// [`Self::send_frame`] keep the default.
    fn poll_send_failure(&mut self) -> Option<(Frame, String)> {
        None
    }

    /// Whether the transport is still up.
    fn is_connected(&self) -> bool;

    /// Tear down the transport. Idempotent.
    fn disconnect(&mut self);

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Redraw the part of the view named by `update`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render<E: Environment<Instant = Self::Instant>>(
        &mut self,
        client: &Client<E>,
        update: &ViewUpdate,
    ) -> Result<(), Self::Error>;
}
