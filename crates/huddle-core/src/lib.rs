//! Protocol-independent building blocks for the Huddle messaging client.
//!
//! Nothing in this crate performs I/O. Time and randomness come in through
//! [`Environment`]; the [`Connection`] state machine takes instants as
//! arguments and returns [`ConnectionAction`]s for a driver to execute.
//!
//! # Components
//!
//! - [`Environment`]: time and randomness seam (production vs simulation)
//! - [`Connection`]: per-workspace session lifecycle, handshake and heartbeat
//! - [`RetryPolicy`]: injectable reconnect/resend policy
//! - [`ids`]: validated identifiers and the [`Room`] and [`Identity`] records

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod ids;
pub mod retry;

pub use connection::{Connection, ConnectionAction, ConnectionConfig, ConnectionState};
pub use env::Environment;
pub use error::{ConnectionError, InvalidId};
pub use ids::{Identity, Room, RoomId, UserId, WorkspaceId};
pub use retry::RetryPolicy;
