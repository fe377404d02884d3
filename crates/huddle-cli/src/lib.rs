//! Line-oriented terminal client for Huddle.
//!
//! A thin shell over [`huddle_app::Driver`] that reads commands from stdin
//! and prints updates to stdout. All orchestration lives in the generic
//! [`huddle_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod command;
pub mod driver;
pub mod view;

pub use command::{Command, CommandError};
pub use driver::{CliDriver, CliError};
pub use view::LineView;
