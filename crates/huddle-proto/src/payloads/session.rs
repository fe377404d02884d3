//! Session management payloads: handshake and disconnect.

use serde::{Deserialize, Serialize};

/// Client handshake, sent once the transport is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    /// Protocol version the client speaks.
    pub version: u8,
    /// Workspace (project) this connection is scoped to.
    pub project_id: String,
    /// Authenticated user id.
    pub user_id: String,
    /// Display name shown to other members.
    pub username: String,
}

/// Server acknowledgement of [`Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloReply {
    /// Server-assigned session identifier.
    pub session_id: u64,
}

/// Graceful disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Human-readable reason.
    pub reason: String,
}
