//! Chat payloads: group subscription and messages.
//!
//! `clientToken` is an optional correlation token. Clients always attach one
//! to [`SendMessage`]; servers that understand it echo it back on the
//! confirmed [`ChatMessage`] so the sender can reconcile exactly instead of by
//! content.

use serde::{Deserialize, Serialize};

/// Subscribe the connection to a group's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroup {
    /// Group to join.
    pub group_id: String,
}

/// Author of a message as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    /// User id.
    pub id: String,
    /// Display name at send time.
    pub username: String,
}

/// Outbound message submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Message body.
    pub content: String,
    /// Workspace the group belongs to.
    pub project_id: String,
    /// Target group.
    pub group_id: String,
    /// Local author.
    pub sender: Sender,
    /// Client wall-clock timestamp, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Correlation token for exact reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}

/// Server-confirmed message (`receiveMessage` body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Permanent server-assigned id.
    pub id: String,
    /// Message body.
    pub content: String,
    /// Group the message was posted to.
    pub group_id: String,
    /// Author.
    pub sender: Sender,
    /// Creation timestamp, milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Echo of the sender's correlation token, if the server supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_token: Option<String>,
}
