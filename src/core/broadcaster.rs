//! Content-oblivious fan-out to room members
//!
//! Payloads are checked for presence and size only. Nothing here decodes,
//! decrypts or rewrites the bytes it forwards.

use log::{debug, info, warn};
use warp::ws::Message as WsMessage;

use crate::config::ServerConfig;
use crate::constants::{INACTIVITY_DESTROY_NOTICE, LEGACY_IMAGE_PREFIX, PEER_LEFT_DESTROY_NOTICE};
use crate::core::connection::ConnectionState;
use crate::core::message_types::{
    EncryptedImage, EncryptedImageSubmission, EncryptedPayload, LegacyImage,
    LegacyImageSubmission, RoomDestroyedNotice, ServerEvent,
};
use crate::core::room::RoomTable;
use crate::core::session::{lock_sessions, Sessions};
use crate::error::{Result, RustyWhisperError};

/// Serialize an event into a text frame
pub fn encode_event(event: &ServerEvent) -> Result<WsMessage> {
    serde_json::to_string(event)
        .map(WsMessage::text)
        .map_err(|e| RustyWhisperError::MessageParseError(format!("Failed to encode event: {}", e)))
}

/// Size ceilings applied before relaying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    pub max_encrypted_bytes: usize,
    pub max_legacy_image_bytes: usize,
}

impl From<&ServerConfig> for PayloadLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_encrypted_bytes: config.max_encrypted_payload_bytes,
            max_legacy_image_bytes: config.max_legacy_image_bytes,
        }
    }
}

fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        return Err(RustyWhisperError::OversizePayload { size, limit });
    }
    Ok(())
}

fn require_bytes(field: Option<Vec<u8>>, name: &str) -> Result<Vec<u8>> {
    match field {
        Some(bytes) if !bytes.is_empty() => Ok(bytes),
        _ => Err(RustyWhisperError::InvalidPayload(format!("{} is required", name))),
    }
}

/// Why a room is being torn down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyReason {
    Inactivity,
    PeerLeft { left_user_id: String },
}

impl DestroyReason {
    fn notice(&self) -> ServerEvent {
        match self {
            Self::Inactivity => ServerEvent::RoomDestructed(INACTIVITY_DESTROY_NOTICE.to_string()),
            Self::PeerLeft { left_user_id } => ServerEvent::RoomDestroyed(RoomDestroyedNotice {
                message: PEER_LEFT_DESTROY_NOTICE.to_string(),
                left_user_id: left_user_id.clone(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct RelayBroadcaster {
    sessions: Sessions,
    limits: PayloadLimits,
}

impl RelayBroadcaster {
    pub fn new(sessions: Sessions, limits: PayloadLimits) -> Self {
        Self { sessions, limits }
    }

    pub fn limits(&self) -> PayloadLimits {
        self.limits
    }

    /// Members of `room_id`, provided `sender_id` is one of them
    fn members_for_sender(table: &RoomTable, room_id: &str, sender_id: &str) -> Result<Vec<String>> {
        match table.get(room_id) {
            Some(room) if room.has_member(sender_id) => Ok(room.participants().to_vec()),
            _ => Err(RustyWhisperError::NotInRoom),
        }
    }

    /// Send an event to a single connection
    pub fn send_to_connection(&self, connection_id: &str, event: &ServerEvent) -> Result<bool> {
        let message = encode_event(event)?;
        let sessions = lock_sessions(&self.sessions)?;
        Ok(sessions
            .get_connection(connection_id)
            .map_or(false, |connection| connection.send(message)))
    }

    /// Send an event to an explicit member list
    pub fn send_to_members(
        &self,
        members: &[String],
        exclude: Option<&str>,
        event: &ServerEvent,
    ) -> Result<usize> {
        if members.is_empty() {
            return Ok(0);
        }
        let message = encode_event(event)?;
        let sessions = lock_sessions(&self.sessions)?;
        Ok(sessions.send_to_members(members, exclude, &message))
    }

    /// Send an event to every current member of a room
    pub fn send_to_room(
        &self,
        table: &RoomTable,
        room_id: &str,
        exclude: Option<&str>,
        event: &ServerEvent,
    ) -> Result<usize> {
        let members = table.participants(room_id);
        self.send_to_members(&members, exclude, event)
    }

    pub fn relay_message(
        &self,
        table: &RoomTable,
        room_id: &str,
        sender_id: &str,
        encrypted: Vec<u8>,
        nonce: Vec<u8>,
    ) -> Result<usize> {
        let encrypted = require_bytes(Some(encrypted), "encrypted")?;
        let nonce = require_bytes(Some(nonce), "nonce")?;
        check_size(encrypted.len() + nonce.len(), self.limits.max_encrypted_bytes)?;

        let members = Self::members_for_sender(table, room_id, sender_id)?;
        let event = ServerEvent::ReceiveMessage(EncryptedPayload { encrypted, nonce });
        let sent = self.send_to_members(&members, Some(sender_id), &event)?;
        debug!("Relayed message from {} to {} peer(s) in {}", sender_id, sent, room_id);
        Ok(sent)
    }

    pub fn relay_encrypted_image(
        &self,
        table: &RoomTable,
        room_id: &str,
        sender_id: &str,
        submission: EncryptedImageSubmission,
    ) -> Result<usize> {
        let encrypted = require_bytes(submission.encrypted, "encrypted")?;
        let nonce = require_bytes(submission.nonce, "nonce")?;
        check_size(encrypted.len() + nonce.len(), self.limits.max_encrypted_bytes)?;

        let members = Self::members_for_sender(table, room_id, sender_id)?;
        debug!(
            "Relaying encrypted image of {} bytes from {} in {}",
            encrypted.len(),
            sender_id,
            room_id
        );
        let event = ServerEvent::ReceiveEncryptedImage(EncryptedImage {
            encrypted,
            nonce,
            name: submission.name,
            kind: submission.kind,
        });
        self.send_to_members(&members, Some(sender_id), &event)
    }

    pub fn relay_legacy_image(
        &self,
        table: &RoomTable,
        room_id: &str,
        sender_id: &str,
        submission: LegacyImageSubmission,
    ) -> Result<usize> {
        let image = match submission.image {
            Some(image) if image.starts_with(LEGACY_IMAGE_PREFIX) => image,
            _ => {
                return Err(RustyWhisperError::InvalidPayload(
                    "image must be a data:image/ URL".to_string(),
                ))
            }
        };
        check_size(image.len(), self.limits.max_legacy_image_bytes)?;

        let members = Self::members_for_sender(table, room_id, sender_id)?;
        let event = ServerEvent::ReceiveImage(LegacyImage {
            image,
            name: submission.name,
            kind: submission.kind,
            sender: sender_id.to_string(),
            timestamp: chrono::Local::now().format("%H:%M").to_string(),
        });
        self.send_to_members(&members, Some(sender_id), &event)
    }

    /// Informational text to the whole room
    pub fn broadcast_system(&self, table: &RoomTable, room_id: &str, text: &str) -> Result<usize> {
        self.send_to_room(table, room_id, None, &ServerEvent::SystemMessage(text.to_string()))
    }

    /// Current membership to the whole room
    pub fn broadcast_room_update(
        &self,
        table: &RoomTable,
        room_id: &str,
        participants: &[String],
    ) -> Result<usize> {
        self.send_to_room(table, room_id, None, &ServerEvent::RoomUpdate(participants.to_vec()))
    }

    /// Remove a room, tell its occupants why and evict them.
    ///
    /// Returns false when the room was already gone.
    pub fn destroy_room(
        &self,
        table: &mut RoomTable,
        room_id: &str,
        reason: &DestroyReason,
    ) -> Result<bool> {
        let room = match table.take_room(room_id) {
            Some(room) => room,
            None => {
                debug!("Room {} already destroyed", room_id);
                return Ok(false);
            }
        };

        let message = encode_event(&reason.notice())?;
        let mut sessions = lock_sessions(&self.sessions)?;
        for member in room.participants() {
            if let Some(connection) = sessions.get_connection_mut(member) {
                connection.send(message.clone());
                if connection.state.room_id() == Some(room_id) {
                    connection.transition(ConnectionState::Destroyed);
                }
            } else {
                warn!("Member {} of room {} has no live connection", member, room_id);
            }
        }

        info!("Room {} destroyed ({:?})", room_id, reason);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::room::RoomRegistry;
    use crate::core::session::create_session_manager;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: RoomRegistry,
        sessions: Sessions,
        broadcaster: RelayBroadcaster,
        rx_a: mpsc::UnboundedReceiver<WsMessage>,
        rx_b: mpsc::UnboundedReceiver<WsMessage>,
    }

    fn paired_room() -> Fixture {
        let registry = RoomRegistry::new();
        let sessions = create_session_manager();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        {
            let mut guard = lock_sessions(&sessions).unwrap();
            guard.register("a".to_string(), tx_a).unwrap();
            guard.register("b".to_string(), tx_b).unwrap();
            guard.set_state("a", ConnectionState::Joined("r".to_string()));
            guard.set_state("b", ConnectionState::Joined("r".to_string()));
        }
        registry.join("r", "a").unwrap();
        registry.join("r", "b").unwrap();

        let limits = PayloadLimits {
            max_encrypted_bytes: 64,
            max_legacy_image_bytes: 32,
        };
        let broadcaster = RelayBroadcaster::new(sessions.clone(), limits);
        Fixture {
            registry,
            sessions,
            broadcaster,
            rx_a,
            rx_b,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(serde_json::from_str(message.to_str().unwrap()).unwrap());
        }
        events
    }

    #[test]
    fn test_relay_message_excludes_sender() {
        let mut fx = paired_room();
        let table = fx.registry.lock().unwrap();

        let sent = fx
            .broadcaster
            .relay_message(&table, "r", "a", vec![1, 2], vec![3])
            .unwrap();
        assert_eq!(sent, 1);
        assert!(drain(&mut fx.rx_a).is_empty());
        assert_eq!(
            drain(&mut fx.rx_b),
            vec![ServerEvent::ReceiveMessage(EncryptedPayload {
                encrypted: vec![1, 2],
                nonce: vec![3],
            })]
        );
    }

    #[test]
    fn test_relay_requires_membership() {
        let fx = paired_room();
        let table = fx.registry.lock().unwrap();
        assert_eq!(
            fx.broadcaster.relay_message(&table, "r", "x", vec![1], vec![1]),
            Err(RustyWhisperError::NotInRoom)
        );
        assert_eq!(
            fx.broadcaster.relay_message(&table, "other", "a", vec![1], vec![1]),
            Err(RustyWhisperError::NotInRoom)
        );
    }

    #[test]
    fn test_oversize_image_is_not_relayed() {
        let mut fx = paired_room();
        let table = fx.registry.lock().unwrap();

        let submission = EncryptedImageSubmission {
            encrypted: Some(vec![0; 100]),
            nonce: Some(vec![1; 24]),
            ..Default::default()
        };
        let result = fx.broadcaster.relay_encrypted_image(&table, "r", "a", submission);
        assert_eq!(
            result,
            Err(RustyWhisperError::OversizePayload { size: 124, limit: 64 })
        );
        assert!(drain(&mut fx.rx_b).is_empty());
    }

    #[test]
    fn test_encrypted_image_requires_nonce() {
        let fx = paired_room();
        let table = fx.registry.lock().unwrap();

        let submission = EncryptedImageSubmission {
            encrypted: Some(vec![1]),
            ..Default::default()
        };
        assert!(matches!(
            fx.broadcaster.relay_encrypted_image(&table, "r", "a", submission),
            Err(RustyWhisperError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_legacy_image_has_lower_ceiling() {
        let mut fx = paired_room();
        let table = fx.registry.lock().unwrap();

        let small = LegacyImageSubmission {
            image: Some("data:image/png;base64,AAAA".to_string()),
            name: Some("x.png".to_string()),
            ..Default::default()
        };
        assert_eq!(fx.broadcaster.relay_legacy_image(&table, "r", "a", small), Ok(1));

        let large = LegacyImageSubmission {
            image: Some(format!("data:image/png;base64,{}", "A".repeat(40))),
            ..Default::default()
        };
        assert!(matches!(
            fx.broadcaster.relay_legacy_image(&table, "r", "a", large),
            Err(RustyWhisperError::OversizePayload { .. })
        ));

        let not_image = LegacyImageSubmission {
            image: Some("javascript:alert(1)".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            fx.broadcaster.relay_legacy_image(&table, "r", "a", not_image),
            Err(RustyWhisperError::InvalidPayload(_))
        ));

        let events = drain(&mut fx.rx_b);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::ReceiveImage(image) => {
                assert_eq!(image.sender, "a");
                assert_eq!(image.name.as_deref(), Some("x.png"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_destroy_room_is_idempotent_and_evicts() {
        let mut fx = paired_room();
        let mut table = fx.registry.lock().unwrap();
        let reason = DestroyReason::Inactivity;

        assert!(fx.broadcaster.destroy_room(&mut table, "r", &reason).unwrap());
        assert!(!fx.broadcaster.destroy_room(&mut table, "r", &reason).unwrap());
        assert!(!table.contains("r"));
        drop(table);

        let expected = vec![ServerEvent::RoomDestructed(INACTIVITY_DESTROY_NOTICE.to_string())];
        assert_eq!(drain(&mut fx.rx_a), expected);
        assert_eq!(drain(&mut fx.rx_b), expected);

        let sessions = lock_sessions(&fx.sessions).unwrap();
        assert_eq!(sessions.state_of("a"), Some(ConnectionState::Destroyed));
        assert_eq!(sessions.state_of("b"), Some(ConnectionState::Destroyed));
    }

    #[test]
    fn test_broadcast_to_missing_room_is_noop() {
        let fx = paired_room();
        let table = fx.registry.lock().unwrap();
        assert_eq!(fx.broadcaster.broadcast_system(&table, "nowhere", "hi"), Ok(0));
    }
}
