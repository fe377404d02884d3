//! Application layer for Huddle.
//!
//! Generic runtime that connects the [`huddle_client::Client`] state machine
//! to platform I/O, so the same orchestration code runs in production and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`Driver`]: Trait for platform-specific I/O (transport, input, rendering)
//! - [`Runtime`]: Generic event loop that feeds the client and executes its
//!   actions through a driver
//! - [`Intent`]: Writes coming from the view layer
//! - [`SystemEnv`]: Production environment (system clock, OS entropy)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod intent;
mod runtime;
mod system_env;

pub use driver::{Driver, ViewUpdate};
pub use intent::Intent;
pub use runtime::Runtime;
pub use system_env::SystemEnv;
