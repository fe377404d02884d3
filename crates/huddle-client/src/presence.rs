//! Who is typing, per room.
//!
//! Every (room, user) pair is either idle (absent) or typing (present with
//! the instant of the last start signal). Three triggers drive it:
//!
//! ```text
//!          Start            Stop / Elapsed
//!   idle ─────────> typing ───────────────> idle
//!                    │  ↑
//!                    └──┘ Start (refresh)
//! ```
//!
//! Stop signals may be lost in transit, so a typist whose last start is older
//! than the typing window is treated as idle. Both the explicit stop and the
//! timeout go through the same transition.

use std::{collections::HashMap, fmt, ops::Sub, time::Duration};

use huddle_core::{RoomId, UserId};

/// Input to [`TypingPresence::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingTrigger<I> {
    /// Remote user started (or is still) typing.
    Start {
        /// Room typed in.
        room_id: RoomId,
        /// Typist.
        user_id: UserId,
        /// Typist's display name.
        display_name: String,
        /// Receipt time.
        now: I,
    },
    /// Remote user stopped typing.
    Stop {
        /// Room typed in.
        room_id: RoomId,
        /// Typist.
        user_id: UserId,
    },
    /// Time passed; evict typists whose window elapsed.
    Elapsed {
        /// Current time.
        now: I,
    },
}

#[derive(Debug, Clone)]
struct Typist<I> {
    user_id: UserId,
    display_name: String,
    last_start: I,
}

/// Per-room typing state for the selected room of one workspace.
#[derive(Debug)]
pub struct TypingPresence<I> {
    local_user: UserId,
    window: Duration,
    selected: Option<RoomId>,
    /// Typists in arrival order.
    rooms: HashMap<RoomId, Vec<Typist<I>>>,
}

impl<I> TypingPresence<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an empty tracker. `local_user` is never shown as typing.
    pub fn new(local_user: UserId, window: Duration) -> Self {
        Self { local_user, window, selected: None, rooms: HashMap::new() }
    }

    /// Apply a trigger. Returns the rooms whose typist set changed.
    pub fn apply(&mut self, trigger: TypingTrigger<I>) -> Vec<RoomId> {
        match trigger {
            TypingTrigger::Start { room_id, user_id, display_name, now } => {
                if self.selected.as_ref() != Some(&room_id) || user_id == self.local_user {
                    return Vec::new();
                }

                let typists = self.rooms.entry(room_id.clone()).or_default();
                match typists.iter_mut().find(|t| t.user_id == user_id) {
                    Some(typist) => {
                        // An entry past its window is already hidden from the
                        // summary, so refreshing it makes it visible again.
                        let visible_change = now - typist.last_start >= self.window
                            || typist.display_name != display_name;
                        typist.last_start = now;
                        typist.display_name = display_name;
                        if visible_change { vec![room_id] } else { Vec::new() }
                    },
                    None => {
                        typists.push(Typist { user_id, display_name, last_start: now });
                        vec![room_id]
                    },
                }
            },

            TypingTrigger::Stop { room_id, user_id } => {
                if self.go_idle(&room_id, |t| t.user_id == user_id) {
                    vec![room_id]
                } else {
                    Vec::new()
                }
            },

            TypingTrigger::Elapsed { now } => {
                let window = self.window;
                let rooms: Vec<RoomId> = self.rooms.keys().cloned().collect();
                rooms
                    .into_iter()
                    .filter(|room_id| self.go_idle(room_id, |t| now - t.last_start >= window))
                    .collect()
            },
        }
    }

    /// typing -> idle for every typist in `room_id` matching `pred`.
    fn go_idle(&mut self, room_id: &RoomId, pred: impl Fn(&Typist<I>) -> bool) -> bool {
        let Some(typists) = self.rooms.get_mut(room_id) else {
            return false;
        };

        let before = typists.len();
        typists.retain(|t| !pred(t));
        let changed = typists.len() != before;

        if typists.is_empty() {
            self.rooms.remove(room_id);
        }
        changed
    }

    /// Switch the selected room, discarding every other room's typists.
    ///
    /// Returns the rooms whose typist set changed.
    pub fn select_room(&mut self, room_id: &RoomId) -> Vec<RoomId> {
        self.selected = Some(room_id.clone());

        let stale: Vec<RoomId> = self.rooms.keys().filter(|r| *r != room_id).cloned().collect();
        for room in &stale {
            self.rooms.remove(room);
        }
        stale
    }

    /// Discard every typist but keep the selection (connection lost).
    ///
    /// Returns the rooms that had typists.
    pub fn drop_typists(&mut self) -> Vec<RoomId> {
        self.rooms.drain().map(|(room_id, _)| room_id).collect()
    }

    /// Discard everything, including the selection (workspace closed).
    ///
    /// Returns the rooms that had typists.
    pub fn clear(&mut self) -> Vec<RoomId> {
        self.selected = None;
        self.drop_typists()
    }

    /// Summary of who is typing in `room_id` at `now`, oldest typist first.
    ///
    /// Entries past the window are excluded even before an `Elapsed` trigger
    /// evicts them.
    pub fn summary(&self, room_id: &RoomId, now: I) -> Option<TypingSummary> {
        let mut names = self
            .rooms
            .get(room_id)?
            .iter()
            .filter(|t| now - t.last_start < self.window)
            .map(|t| t.display_name.clone());

        let first = names.next()?;
        let Some(second) = names.next() else {
            return Some(TypingSummary::One(first));
        };

        match names.count() {
            0 => Some(TypingSummary::Two(first, second)),
            others => Some(TypingSummary::Many { first, second, others }),
        }
    }

    /// Whether `user_id` is currently shown as typing in `room_id`.
    pub fn is_typing(&self, room_id: &RoomId, user_id: &UserId, now: I) -> bool {
        self.rooms.get(room_id).is_some_and(|typists| {
            typists.iter().any(|t| &t.user_id == user_id && now - t.last_start < self.window)
        })
    }
}

/// Human-readable typing indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypingSummary {
    /// Exactly one typist.
    One(String),
    /// Exactly two typists.
    Two(String, String),
    /// Three or more: the first two by name plus a count.
    Many {
        /// First typist.
        first: String,
        /// Second typist.
        second: String,
        /// Number of further typists.
        others: usize,
    },
}

impl fmt::Display for TypingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(name) => write!(f, "{name} is typing..."),
            Self::Two(first, second) => write!(f, "{first} and {second} are typing..."),
            Self::Many { first, second, others: 1 } => {
                write!(f, "{first}, {second} and 1 other are typing...")
            },
            Self::Many { first, second, others } => {
                write!(f, "{first}, {second} and {others} others are typing...")
            },
        }
    }
}
