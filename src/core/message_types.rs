//! Wire events exchanged with clients
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Byte buffers travel as JSON arrays of numbers and are never inspected.

use serde::{Deserialize, Serialize};

/// Client-to-server events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join-room")]
    JoinRoom(JoinRequest),

    #[serde(rename = "send-public-key")]
    SendPublicKey(PublicKeySubmission),

    #[serde(rename = "send-message")]
    SendMessage(MessageSubmission),

    #[serde(rename = "send-encrypted-image")]
    SendEncryptedImage(EncryptedImageSubmission),

    /// Unencrypted data-URL image from older clients
    #[serde(rename = "image-message")]
    ImageMessage(LegacyImageSubmission),

    #[serde(rename = "startInactivityCountdown")]
    StartInactivityCountdown,

    #[serde(rename = "cancelInactivityCountdown")]
    CancelInactivityCountdown,

    #[serde(rename = "leave-room")]
    LeaveRoom(LeaveRequest),
}

impl ClientEvent {
    /// Event name as it appears on the wire, for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join-room",
            Self::SendPublicKey(_) => "send-public-key",
            Self::SendMessage(_) => "send-message",
            Self::SendEncryptedImage(_) => "send-encrypted-image",
            Self::ImageMessage(_) => "image-message",
            Self::StartInactivityCountdown => "startInactivityCountdown",
            Self::CancelInactivityCountdown => "cancelInactivityCountdown",
            Self::LeaveRoom(_) => "leave-room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeySubmission {
    pub room_id: String,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSubmission {
    pub room_id: String,
    pub encrypted: Vec<u8>,
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedImageSubmission {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub encrypted: Option<Vec<u8>>,
    #[serde(default)]
    pub nonce: Option<Vec<u8>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyImageSubmission {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    #[serde(default)]
    pub room_id: Option<String>,
}

/// Server-to-client events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Sent once after the upgrade so the client learns its own ID
    #[serde(rename = "connected")]
    Connected(ConnectedPayload),

    #[serde(rename = "join-error")]
    JoinError(String),

    #[serde(rename = "receive-public-key")]
    ReceivePublicKey(PublicKeyAnnouncement),

    #[serde(rename = "receive-message")]
    ReceiveMessage(EncryptedPayload),

    #[serde(rename = "receive-image")]
    ReceiveImage(LegacyImage),

    #[serde(rename = "receive-encrypted-image")]
    ReceiveEncryptedImage(EncryptedImage),

    #[serde(rename = "system-message")]
    SystemMessage(String),

    #[serde(rename = "room-update")]
    RoomUpdate(Vec<String>),

    #[serde(rename = "start-chat")]
    StartChat,

    #[serde(rename = "start-inactivity-countdown")]
    StartInactivityCountdown(CountdownStarted),

    #[serde(rename = "cancel-inactivity-countdown")]
    CancelInactivityCountdown,

    /// Terminal notice after an inactivity expiry
    #[serde(rename = "roomDestructed")]
    RoomDestructed(String),

    /// Terminal notice after the peer departed
    #[serde(rename = "room-destroyed")]
    RoomDestroyed(RoomDestroyedNotice),

    #[serde(rename = "user-left")]
    UserLeft(String),

    #[serde(rename = "error")]
    Error(ErrorPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyAnnouncement {
    pub public_key: Vec<u8>,
    pub their_socket_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub encrypted: Vec<u8>,
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyImage {
    pub image: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub sender: String,
    /// Wall-clock `HH:MM` at relay time
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedImage {
    pub encrypted: Vec<u8>,
    pub nonce: Vec<u8>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownStarted {
    /// Milliseconds since the Unix epoch
    pub start_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDestroyedNotice {
    pub message: String,
    pub left_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}
