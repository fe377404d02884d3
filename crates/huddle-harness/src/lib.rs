//! Deterministic simulation harness for Huddle client testing.
//!
//! Virtual-clock implementations of the Environment and Driver traits plus an
//! in-memory reference server, for reproducible multi-client scenarios.
//!
//! # Simulation
//!
//! [`SimWorld`] drives several [`huddle_client::Client`]s against one
//! [`SimServer`] synchronously. [`SimDriver`] plugs the same server into the
//! production [`huddle_app::Runtime`].
//!
//! # Invariant Testing
//!
//! [`SimWorld::check_invariants`] runs [`InvariantRegistry::standard()`]:
//! no message shown twice, unconfirmed sends only at the tail, no self typing
//! and unique local tokens.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod network;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;
pub mod world;

pub use invariants::{
    ClientSnapshot, ConfirmedPrefixFirst, Invariant, InvariantRegistry, InvariantResult,
    LocalTokensUnique, NoSelfTyping, RoomSnapshot, SystemSnapshot, UniqueServerIds, Violation,
};
pub use network::{NetworkError, SharedNetwork, SimNetwork};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::{Delivery, SimServer, SimServerConfig};
pub use world::{ClientId, SimWorld};
