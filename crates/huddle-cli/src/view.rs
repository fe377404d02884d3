//! Line-oriented rendering.
//!
//! The terminal is append-only, so the view remembers what it already
//! printed: confirmed messages once per server id, failed sends once per
//! local token, and a typing line only when the summary changes.
//! Provisional messages are not printed; the user just typed them.

use std::{
    collections::{HashMap, HashSet},
    io::{self, Write},
};

use huddle_app::ViewUpdate;
use huddle_client::{Client, MessageKey, MessageState};
use huddle_core::{Environment, RoomId};

/// Append-only view over a writer.
#[derive(Debug)]
pub struct LineView<W> {
    out: W,
    printed: HashSet<MessageKey>,
    typing: HashMap<RoomId, Option<String>>,
}

impl<W: Write> LineView<W> {
    /// View writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out, printed: HashSet::new(), typing: HashMap::new() }
    }

    /// Print a notice that is not tied to client state.
    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "! {text}")
    }

    /// Print whatever `update` made visible.
    pub fn render<E: Environment>(
        &mut self,
        client: &Client<E>,
        update: &ViewUpdate,
    ) -> io::Result<()> {
        match update {
            ViewUpdate::Connection(state) => writeln!(self.out, "* {} {state}", client.workspace_id())?,
            ViewUpdate::Messages(room_id) => {
                for message in client.sequence_for(room_id) {
                    match message.state {
                        MessageState::Provisional => {},
                        MessageState::Confirmed => {
                            if self.printed.insert(message.key.clone()) {
                                writeln!(
                                    self.out,
                                    "[{room_id}] {}: {}",
                                    message.sender.display_name, message.body
                                )?;
                            }
                        },
                        MessageState::Failed { attempts } => {
                            if self.printed.insert(message.key.clone()) {
                                writeln!(
                                    self.out,
                                    "! [{room_id}] not delivered after {attempts} attempt(s): {}",
                                    message.body
                                )?;
                            }
                        },
                    }
                }
            },
            ViewUpdate::Presence(room_id) => {
                let summary = client.typing_summary(room_id).map(|s| s.to_string());
                if self.typing.get(room_id) != Some(&summary) {
                    if let Some(text) = &summary {
                        writeln!(self.out, "~ [{room_id}] {text}")?;
                    }
                    self.typing.insert(room_id.clone(), summary);
                }
            },
        }

        self.out.flush()
    }

    /// The underlying writer.
    pub fn writer(&self) -> &W {
        &self.out
    }
}
