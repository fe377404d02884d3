//! Stdin/stdout driver.
//!
//! Implements the [`Driver`] trait with stdin lines for input, an
//! append-only [`LineView`] on stdout for output, and quinn QUIC for the
//! network.

use std::{
    collections::VecDeque,
    io::{self, Stdout, stdout},
    time::{Duration, Instant},
};

use huddle_app::{Driver, Intent, SystemEnv, ViewUpdate};
use huddle_client::{
    Client,
    transport::{self, ConnectedClient, TransportError},
};
use huddle_core::{Environment, Room, RoomId, UserId, WorkspaceId};
use huddle_proto::Frame;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use crate::{
    command::{self, Command},
    view::LineView,
};

/// How long [`Driver::poll_intent`] waits for a line before the runtime
/// ticks.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// CLI driver errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// I/O error on stdin or stdout.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The connection task is gone.
    #[error("channel send error")]
    ChannelSend,

    /// No transport is open.
    #[error("not connected")]
    NotConnected,
}

/// Driver over stdin, stdout and a QUIC connection.
pub struct CliDriver {
    env: SystemEnv,
    server_addr: String,
    user_id: UserId,
    workspace_id: WorkspaceId,
    lines: Lines<BufReader<Stdin>>,
    view: LineView<Stdout>,
    connection: Option<ConnectedClient>,
    current_room: Option<RoomId>,
    queued: VecDeque<Intent>,
}

impl CliDriver {
    /// Driver for `user_id` in `workspace_id`, connecting to `server_addr`.
    pub fn new(
        env: SystemEnv,
        server_addr: String,
        user_id: UserId,
        workspace_id: WorkspaceId,
    ) -> Self {
        Self {
            env,
            server_addr,
            user_id,
            workspace_id,
            lines: BufReader::new(tokio::io::stdin()).lines(),
            view: LineView::new(stdout()),
            connection: None,
            current_room: None,
            queued: VecDeque::new(),
        }
    }

    /// Select `room` as soon as the runtime starts polling.
    pub fn select_on_start(&mut self, room: Room) {
        self.current_room = Some(room.id.clone());
        self.queued.push_back(Intent::SelectRoom(room));
    }

    /// Turn a parsed command into an intent. Commands that need a room
    /// print a notice and yield nothing while none is selected.
    fn intent_for(&mut self, command: Command) -> Result<Option<Intent>, CliError> {
        let intent = match command {
            Command::Join(room_id) => {
                let room = Room::new(
                    room_id.clone(),
                    self.workspace_id.clone(),
                    room_id.as_str(),
                    self.user_id.clone(),
                );
                self.current_room = Some(room_id);
                Intent::SelectRoom(room)
            },
            Command::Typing => match self.require_room()? {
                Some(room_id) => Intent::Keystroke { room_id },
                None => return Ok(None),
            },
            Command::Say(body) => match self.require_room()? {
                Some(room_id) => Intent::Submit { room_id, body },
                None => return Ok(None),
            },
            Command::Open => Intent::Open,
            Command::Close => Intent::Close,
            Command::Quit => Intent::Quit,
        };

        Ok(Some(intent))
    }

    fn require_room(&mut self) -> Result<Option<RoomId>, CliError> {
        if self.current_room.is_none() {
            self.view.notice("join a room first: /join <room>")?;
        }
        Ok(self.current_room.clone())
    }
}

impl Driver for CliDriver {
    type Error = CliError;
    type Instant = Instant;

    async fn poll_intent(&mut self) -> Result<Option<Intent>, Self::Error> {
        if let Some(intent) = self.queued.pop_front() {
            return Ok(Some(intent));
        }

        let line = tokio::select! {
            line = self.lines.next_line() => line?,
            () = tokio::time::sleep(INPUT_POLL) => return Ok(None),
        };

        // EOF on stdin ends the session.
        let Some(line) = line else {
            return Ok(Some(Intent::Quit));
        };

        match command::parse(&line) {
            Ok(Some(command)) => self.intent_for(command),
            Ok(None) => Ok(None),
            Err(error) => {
                self.view.notice(&error.to_string())?;
                Ok(None)
            },
        }
    }

    async fn connect(&mut self, workspace_id: &WorkspaceId) -> Result<(), Self::Error> {
        debug!(workspace = %workspace_id, server = %self.server_addr, "connecting");
        let client = transport::connect(&self.server_addr).await?;
        info!(server = %self.server_addr, "transport up");
        self.connection = Some(client);
        Ok(())
    }

    async fn send_frame(&mut self, frame: Frame) -> Result<(), Self::Error> {
        let conn = self.connection.as_ref().ok_or(CliError::NotConnected)?;
        conn.to_server.send(frame).await.map_err(|_| CliError::ChannelSend)
    }

    async fn recv_frame(&mut self) -> Option<Frame> {
        self.connection.as_mut().and_then(|conn| conn.from_server.try_recv().ok())
    }

    fn poll_send_failure(&mut self) -> Option<(Frame, String)> {
        let failure = self.connection.as_mut()?.send_failures.try_recv().ok()?;
        Some((failure.frame, failure.error.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(ConnectedClient::is_running)
    }

    fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.stop();
        }
    }

    fn now(&self) -> Self::Instant {
        self.env.now()
    }

    fn render<E: Environment<Instant = Self::Instant>>(
        &mut self,
        client: &Client<E>,
        update: &ViewUpdate,
    ) -> Result<(), Self::Error> {
        Ok(self.view.render(client, update)?)
    }
}

impl Drop for CliDriver {
    fn drop(&mut self) {
        self.disconnect();
    }
}
