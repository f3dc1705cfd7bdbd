//! Peer and room identity

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Client-chosen peer identifier, unique within a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

/// Room name shared by every peer that wants to see each other
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(PeerId);
string_id!(RoomId);

/// The three strings a connection must present before it may join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub peer_id: PeerId,
    pub room_id: RoomId,
    pub username: String,
}

impl Identity {
    /// Build an identity, rejecting any blank field
    pub fn new(
        peer_id: impl Into<String>,
        room_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Result<Self> {
        let peer_id = required("userId", peer_id.into())?;
        let room_id = required("roomId", room_id.into())?;
        let username = required("username", username.into())?;

        Ok(Self {
            peer_id: PeerId(peer_id),
            room_id: RoomId(room_id),
            username,
        })
    }

    /// Member-list entry for this identity
    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            id: self.peer_id.clone(),
            username: self.username.clone(),
        }
    }
}

fn required(field: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::InvalidIdentity(format!("missing {}", field)));
    }
    Ok(value)
}

/// One entry of a room's member list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: PeerId,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_valid() {
        let identity = Identity::new("a", "r1", "Alice").unwrap();
        assert_eq!(identity.peer_id.as_str(), "a");
        assert_eq!(identity.room_id, RoomId::from("r1"));
        assert_eq!(identity.username, "Alice");
    }

    #[test]
    fn test_identity_rejects_blank_fields() {
        let err = Identity::new("", "r1", "Alice").unwrap_err();
        assert!(err.to_string().contains("userId"));

        let err = Identity::new("a", "  ", "Alice").unwrap_err();
        assert!(err.to_string().contains("roomId"));

        let err = Identity::new("a", "r1", "").unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn test_user_info_wire_shape() {
        let identity = Identity::new("a", "r1", "Alice").unwrap();
        let json = serde_json::to_value(identity.user_info()).unwrap();
        assert_eq!(json, serde_json::json!({"id": "a", "username": "Alice"}));
    }
}
