//! Client
//!
//! Action-based state machine for the Huddle real-time group-messaging
//! client. One [`Client`] exists per open workspace; it owns the connection,
//! the selected room, every room's message sequence and the typing presence
//! of the selected room.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and action-based pattern as
//! [`huddle_core`]. It receives events ([`ClientEvent`]) through a single
//! entry point, processes them through pure state machine logic, and returns
//! actions ([`ClientAction`]) for the caller to execute.
//!
//! # Components
//!
//! - [`Client`]: workspace-scoped dispatcher
//! - [`RoomMembership`]: selected room and join intents
//! - [`MessageStore`]: per-room sequences, optimistic sends and reconciliation
//! - [`TypingPresence`]: who is typing, with local expiry
//! - [`Composer`]: keystroke debounce into typing signals
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: frame channels over QUIC
//! - [`transport::connect`]: connect to a server

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod composer;
mod config;
mod error;
mod event;
mod membership;
mod presence;
mod store;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::Client;
pub use composer::{Composer, ComposerSignal};
pub use config::{ClientConfig, TYPING_WINDOW};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use huddle_core::{
    ConnectionState, Environment, Identity, RetryPolicy, Room, RoomId, UserId, WorkspaceId,
};
pub use membership::RoomMembership;
pub use presence::{TypingPresence, TypingSummary, TypingTrigger};
pub use store::{
    ConfirmedMessage, LocalToken, Message, MessageKey, MessageState, MessageStore, Reconciled,
};
