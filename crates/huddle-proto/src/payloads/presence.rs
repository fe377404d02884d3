//! Typing presence payloads.
//!
//! Outbound (`typing`, `stopTyping`) and inbound (`userTyping`,
//! `userStoppedTyping`) carry the same information; they are separate types
//! because the server reorders the fields and may drop any of them in
//! transit.

use serde::{Deserialize, Serialize};

/// Local user started typing in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    /// Group being typed in.
    pub group_id: String,
    /// Typist.
    pub user_id: String,
    /// Typist's display name.
    pub username: String,
}

/// Local user stopped typing in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTyping {
    /// Group the user was typing in.
    pub group_id: String,
    /// Typist.
    pub user_id: String,
}

/// Remote user started typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    /// Typist.
    pub user_id: String,
    /// Group being typed in.
    pub group_id: String,
    /// Typist's display name.
    pub username: String,
}

/// Remote user stopped typing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoppedTyping {
    /// Typist.
    pub user_id: String,
    /// Group the user was typing in.
    pub group_id: String,
}
