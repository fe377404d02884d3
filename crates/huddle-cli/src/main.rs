//! Huddle terminal client.
//!
//! # Usage
//!
//! ```bash
//! huddle --server 127.0.0.1:4433 --workspace acme --user alice --name Alice --room general
//! ```
//!
//! Lines typed on stdin are sent to the current room. `/join <room>`,
//! `/typing`, `/close`, `/open` and `/quit` control the session.

use std::time::Duration;

use clap::Parser;
use huddle_app::{Runtime, SystemEnv};
use huddle_cli::CliDriver;
use huddle_client::{
    Client, ClientConfig, Identity, RetryPolicy, Room, RoomId, UserId, WorkspaceId,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Huddle terminal client
#[derive(Parser, Debug)]
#[command(name = "huddle")]
#[command(about = "Terminal client for Huddle group messaging")]
#[command(version)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:4433")]
    server: String,

    /// Workspace to open
    #[arg(short, long)]
    workspace: String,

    /// User id to sign in as
    #[arg(short, long)]
    user: String,

    /// Display name shown to others (defaults to the user id)
    #[arg(short, long)]
    name: Option<String>,

    /// Room to select on startup
    #[arg(short, long)]
    room: Option<String>,

    /// Typing window in milliseconds
    #[arg(long, default_value = "3000")]
    typing_window_ms: u64,

    /// Reconnect attempts after the connection drops (0 disables)
    #[arg(long, default_value = "0")]
    reconnect_attempts: u32,

    /// Resend attempts for messages the transport rejects (0 disables)
    #[arg(long, default_value = "0")]
    resend_attempts: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn policy(attempts: u32) -> RetryPolicy {
    if attempts == 0 { RetryPolicy::Never } else { RetryPolicy::backoff(attempts) }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    // stdout carries the conversation; logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let workspace_id = WorkspaceId::new(args.workspace)?;
    let user_id = UserId::new(args.user)?;
    let name = args.name.unwrap_or_else(|| user_id.to_string());

    let config = ClientConfig {
        typing_window: Duration::from_millis(args.typing_window_ms),
        reconnect: policy(args.reconnect_attempts),
        resend: policy(args.resend_attempts),
        ..ClientConfig::default()
    };

    tracing::info!(workspace = %workspace_id, user = %user_id, server = %args.server, "starting");

    let env = SystemEnv::new();
    let client =
        Client::new(env.clone(), Identity::new(user_id.clone(), name), workspace_id.clone(), config);
    let mut driver = CliDriver::new(env, args.server, user_id.clone(), workspace_id.clone());

    if let Some(room) = args.room {
        let room_id = RoomId::new(room.as_str())?;
        driver.select_on_start(Room::new(room_id, workspace_id, room, user_id));
    }

    Runtime::new(driver, client).run().await?;

    Ok(())
}
