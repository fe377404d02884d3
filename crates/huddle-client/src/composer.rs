//! Outbound typing signals for the local user.
//!
//! A typing-start is emitted once per idle -> active transition, not per
//! keystroke. Each keystroke restarts the window; when it elapses without
//! another keystroke a single typing-stop is emitted. The window is the same
//! constant remote peers use to expire our entry, so under normal delivery
//! they see the explicit stop first.

use std::{ops::Sub, time::Duration};

use huddle_core::RoomId;

/// Typing signal to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposerSignal {
    /// Emit `typing` for this room.
    Start(RoomId),
    /// Emit `stopTyping` for this room.
    Stop(RoomId),
}

#[derive(Debug, Clone)]
enum ComposerState<I> {
    Idle,
    Active { room_id: RoomId, last_keystroke: I },
}

/// Debounces local keystrokes into typing signals.
#[derive(Debug)]
pub struct Composer<I> {
    window: Duration,
    state: ComposerState<I>,
}

impl<I> Composer<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an idle composer.
    pub fn new(window: Duration) -> Self {
        Self { window, state: ComposerState::Idle }
    }

    /// Room the local user is currently typing in.
    pub fn active_room(&self) -> Option<&RoomId> {
        match &self.state {
            ComposerState::Idle => None,
            ComposerState::Active { room_id, .. } => Some(room_id),
        }
    }

    /// Local keystroke in `room_id`.
    pub fn on_keystroke(&mut self, room_id: &RoomId, now: I) -> Vec<ComposerSignal> {
        match &mut self.state {
            ComposerState::Active { room_id: active, last_keystroke } if active == room_id => {
                let expired = now - *last_keystroke >= self.window;
                *last_keystroke = now;
                if expired {
                    // The window ran out before a tick observed it: close the
                    // old activation and open a fresh one.
                    return vec![
                        ComposerSignal::Stop(room_id.clone()),
                        ComposerSignal::Start(room_id.clone()),
                    ];
                }
                Vec::new()
            },
            // Only reachable through direct use; `Client` resets the composer
            // on room switch before a keystroke in another room.
            ComposerState::Active { room_id: active, .. } => {
                let stop = ComposerSignal::Stop(active.clone());
                self.state = ComposerState::Active { room_id: room_id.clone(), last_keystroke: now };
                vec![stop, ComposerSignal::Start(room_id.clone())]
            },
            ComposerState::Idle => {
                self.state = ComposerState::Active { room_id: room_id.clone(), last_keystroke: now };
                vec![ComposerSignal::Start(room_id.clone())]
            },
        }
    }

    /// Emit the stop once the window has elapsed since the last keystroke.
    pub fn tick(&mut self, now: I) -> Option<ComposerSignal> {
        let ComposerState::Active { room_id, last_keystroke } = &self.state else {
            return None;
        };
        if now - *last_keystroke < self.window {
            return None;
        }

        let stop = ComposerSignal::Stop(room_id.clone());
        self.state = ComposerState::Idle;
        Some(stop)
    }

    /// A message was sent in `room_id`. Always emits a stop.
    pub fn on_send(&mut self, room_id: &RoomId) -> ComposerSignal {
        self.state = ComposerState::Idle;
        ComposerSignal::Stop(room_id.clone())
    }

    /// The selected room changed. Emits a stop if the user was typing.
    pub fn on_room_switch(&mut self) -> Option<ComposerSignal> {
        match std::mem::replace(&mut self.state, ComposerState::Idle) {
            ComposerState::Active { room_id, .. } => Some(ComposerSignal::Stop(room_id)),
            ComposerState::Idle => None,
        }
    }

    /// Cancel the timer without emitting anything (connection gone).
    pub fn reset(&mut self) {
        self.state = ComposerState::Idle;
    }
}
