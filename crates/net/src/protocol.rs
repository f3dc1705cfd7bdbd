//! Signaling wire protocol
//!
//! One frame carries one JSON envelope. Negotiation payloads (`data`) are
//! opaque to the relay and forwarded unchanged.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use signalhub_core::{Identity, PeerId, RoomId, UserInfo};

/// Envelope `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Offer,
    Answer,
    IceCandidate,
    UserJoined,
    UserLeft,
    UserList,
}

impl MessageType {
    /// Types a peer may send; everything else is hub-originated
    pub fn is_signal(self) -> bool {
        matches!(
            self,
            MessageType::Offer | MessageType::Answer | MessageType::IceCandidate
        )
    }
}

/// A routable message unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,

    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,

    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<PeerId>,

    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "non_empty", skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<PeerId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Empty strings on the wire mean "not set"
fn non_empty<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(T::from))
}

impl Envelope {
    fn bare(kind: MessageType) -> Self {
        Self {
            kind,
            room_id: None,
            user_id: None,
            username: None,
            target_user_id: None,
            data: None,
        }
    }

    /// A peer with this identity entered the room
    pub fn user_joined(user_id: PeerId, username: String) -> Self {
        Self {
            user_id: Some(user_id),
            username: Some(username),
            ..Self::bare(MessageType::UserJoined)
        }
    }

    /// A peer left the room
    pub fn user_left(user_id: PeerId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::bare(MessageType::UserLeft)
        }
    }

    /// Full member list, sent to a newly joined peer
    pub fn user_list(users: &[UserInfo]) -> Self {
        let entries = users
            .iter()
            .map(|u| serde_json::json!({ "id": u.id.as_str(), "username": u.username }))
            .collect();
        Self {
            data: Some(Value::Array(entries)),
            ..Self::bare(MessageType::UserList)
        }
    }

    /// Overwrite sender fields with the connection's identity
    pub fn stamp(&mut self, identity: &Identity) {
        self.room_id = Some(identity.room_id.clone());
        self.user_id = Some(identity.peer_id.clone());
        self.username = Some(identity.username.clone());
    }

    /// Serialize to the text form written to the wire
    pub fn to_payload(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// First frame on a raw TCP connection, carrying the identity a WebSocket
/// client would put in its query string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub username: String,
}

impl Hello {
    /// Validate into an identity
    pub fn into_identity(self) -> signalhub_core::Result<Identity> {
        Identity::new(self.user_id, self.room_id, self.username)
    }
}
