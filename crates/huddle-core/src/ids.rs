//! Validated identifiers and the records built from them.
//!
//! Identifiers are opaque strings assigned by the CRUD service. The only
//! constraint enforced here is that they are non-empty; anything else is the
//! server's business.

use std::{collections::BTreeSet, fmt};

use crate::error::InvalidId;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap an identifier.
            ///
            /// # Errors
            ///
            /// - [`InvalidId`] if `raw` is empty after trimming whitespace
            pub fn new(raw: impl Into<String>) -> Result<Self, InvalidId> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(InvalidId { kind: $kind });
                }
                Ok(Self(raw))
            }

            /// Identifier as sent on the wire.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Collaboration context (a project). Scopes one connection.
    WorkspaceId,
    "workspace"
);

string_id!(
    /// Chat room (group) within a workspace.
    RoomId,
    "room"
);

string_id!(
    /// User account.
    UserId,
    "user"
);

/// The local user as seen by other members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Account id.
    pub user_id: UserId,
    /// Name rendered next to messages and in typing summaries.
    pub display_name: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self { user_id, display_name: display_name.into() }
    }
}

/// A chat room as supplied by the CRUD service.
///
/// The owner is always a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    /// Room id.
    pub id: RoomId,
    /// Workspace the room belongs to.
    pub workspace_id: WorkspaceId,
    /// Display name.
    pub name: String,
    /// Creator of the room.
    pub owner: UserId,
    /// Member set, including the owner.
    pub members: BTreeSet<UserId>,
    /// Whether this is the workspace's default room.
    pub is_default: bool,
}

impl Room {
    /// Create a non-default room whose only member is its owner.
    pub fn new(
        id: RoomId,
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        owner: UserId,
    ) -> Self {
        let members = BTreeSet::from([owner.clone()]);
        Self { id, workspace_id, name: name.into(), owner, members, is_default: false }
    }

    /// Add a member.
    #[must_use]
    pub fn with_member(mut self, user: UserId) -> Self {
        self.members.insert(user);
        self
    }

    /// Mark as the workspace default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Whether `user` belongs to this room.
    #[must_use]
    pub fn has_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ids_rejected() {
        assert_eq!(WorkspaceId::new(""), Err(InvalidId { kind: "workspace" }));
        assert_eq!(RoomId::new("   "), Err(InvalidId { kind: "room" }));
        assert!(UserId::new("u-1").is_ok());
    }

    #[test]
    fn owner_is_member() {
        let owner = UserId::new("alice").unwrap();
        let room = Room::new(
            RoomId::new("general").unwrap(),
            WorkspaceId::new("acme").unwrap(),
            "General",
            owner.clone(),
        )
        .with_member(UserId::new("bob").unwrap());

        assert!(room.has_member(&owner));
        assert_eq!(room.members.len(), 2);
        assert!(!room.is_default);
    }
}
