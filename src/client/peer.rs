//! Endpoint side of the relay protocol
//!
//! `PeerSession` owns no socket. Feed it server events, send whatever
//! `PeerOutput::Send` it returns, and render the rest.

use log::{debug, info, warn};

use crate::client::crypto::{KeyAgreement, KeyPair};
use crate::core::key_exchange::{KeyExchangeRole, KeyExchangeState};
use crate::core::message_types::{
    ClientEvent, EncryptedImageSubmission, JoinRequest, LeaveRequest, MessageSubmission,
    PublicKeySubmission, ServerEvent,
};
use crate::error::{Result, RustyWhisperError};

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    JoinRejected(String),
    Destructed(String),
    PeerLeft(String),
    /// We left on our own
    Left,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerOutput {
    /// Event to put on the wire
    Send(ClientEvent),
    EncryptionReady { peer_id: String },
    Message(String),
    Image {
        bytes: Vec<u8>,
        name: Option<String>,
        kind: Option<String>,
    },
    /// Unencrypted data-URL image from an older peer
    LegacyImage {
        image: String,
        name: Option<String>,
        sender: String,
        timestamp: String,
    },
    System(String),
    Participants(Vec<String>),
    ChatStarted,
    CountdownStarted { start_time: i64 },
    CountdownCancelled,
    Rejected { code: String, message: String },
    Ended(SessionEnd),
}

pub struct PeerSession<K: KeyAgreement> {
    agreement: K,
    room_id: String,
    key_pair: KeyPair,
    connection_id: Option<String>,
    exchange: KeyExchangeState,
    shared_key: Option<Vec<u8>>,
    peer_id: Option<String>,
    ended: Option<SessionEnd>,
}

impl<K: KeyAgreement> PeerSession<K> {
    pub fn new(agreement: K, room_id: impl Into<String>) -> Result<Self> {
        let key_pair = agreement.generate_key_pair()?;
        Ok(Self {
            agreement,
            room_id: room_id.into(),
            key_pair,
            connection_id: None,
            exchange: KeyExchangeState::default(),
            shared_key: None,
            peer_id: None,
            ended: None,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    pub fn peer_id(&self) -> Option<&str> {
        self.peer_id.as_deref()
    }

    pub fn public_key(&self) -> &[u8] {
        &self.key_pair.public
    }

    pub fn has_shared_key(&self) -> bool {
        self.shared_key.is_some()
    }

    pub fn ended(&self) -> Option<&SessionEnd> {
        self.ended.as_ref()
    }

    /// Re-announce while no shared key exists (see `KEY_RESEND_AFTER_MS`)
    pub fn needs_key_resend(&self) -> bool {
        self.connection_id.is_some() && self.shared_key.is_none() && self.ended.is_none()
    }

    pub fn announce_key(&self) -> ClientEvent {
        ClientEvent::SendPublicKey(PublicKeySubmission {
            room_id: self.room_id.clone(),
            public_key: self.key_pair.public.clone(),
        })
    }

    pub fn on_connected(&mut self, connection_id: &str) -> Vec<PeerOutput> {
        self.connection_id = Some(connection_id.to_string());
        vec![
            PeerOutput::Send(ClientEvent::JoinRoom(JoinRequest {
                room_id: self.room_id.clone(),
            })),
            PeerOutput::Send(self.announce_key()),
        ]
    }

    pub fn leave(&mut self) -> ClientEvent {
        self.shared_key = None;
        self.exchange = KeyExchangeState::default();
        self.ended = Some(SessionEnd::Left);
        ClientEvent::LeaveRoom(LeaveRequest {
            room_id: Some(self.room_id.clone()),
        })
    }

    pub fn on_server_event(&mut self, event: ServerEvent) -> Result<Vec<PeerOutput>> {
        if self.ended.is_some() {
            debug!("Session already ended, dropping {:?}", event);
            return Ok(Vec::new());
        }

        let outputs = match event {
            ServerEvent::Connected(payload) => self.on_connected(&payload.connection_id),

            ServerEvent::ReceivePublicKey(announcement) => {
                self.on_peer_key(&announcement.their_socket_id, &announcement.public_key)?
            }

            ServerEvent::ReceiveMessage(payload) => {
                let key = match &self.shared_key {
                    Some(key) => key,
                    None => {
                        warn!("Message arrived before the shared key, dropped");
                        return Ok(Vec::new());
                    }
                };
                let plaintext = self
                    .agreement
                    .decrypt(&payload.encrypted, &payload.nonce, key)?;
                let text = String::from_utf8(plaintext)
                    .map_err(|_| RustyWhisperError::DecryptionFailure)?;
                vec![PeerOutput::Message(text)]
            }

            ServerEvent::ReceiveEncryptedImage(image) => {
                let key = match &self.shared_key {
                    Some(key) => key,
                    None => {
                        warn!("Image arrived before the shared key, dropped");
                        return Ok(Vec::new());
                    }
                };
                let bytes = self
                    .agreement
                    .decrypt(&image.encrypted, &image.nonce, key)?;
                vec![PeerOutput::Image {
                    bytes,
                    name: image.name,
                    kind: image.kind,
                }]
            }

            ServerEvent::ReceiveImage(image) => vec![PeerOutput::LegacyImage {
                image: image.image,
                name: image.name,
                sender: image.sender,
                timestamp: image.timestamp,
            }],

            ServerEvent::SystemMessage(text) => vec![PeerOutput::System(text)],
            ServerEvent::RoomUpdate(participants) => vec![PeerOutput::Participants(participants)],
            ServerEvent::StartChat => vec![PeerOutput::ChatStarted],

            ServerEvent::StartInactivityCountdown(started) => vec![PeerOutput::CountdownStarted {
                start_time: started.start_time,
            }],
            ServerEvent::CancelInactivityCountdown => vec![PeerOutput::CountdownCancelled],

            ServerEvent::Error(payload) => vec![PeerOutput::Rejected {
                code: payload.code,
                message: payload.message,
            }],

            ServerEvent::JoinError(message) => self.end(SessionEnd::JoinRejected(message)),
            ServerEvent::RoomDestructed(message) => self.end(SessionEnd::Destructed(message)),
            ServerEvent::RoomDestroyed(notice) => self.end(SessionEnd::PeerLeft(notice.left_user_id)),
            ServerEvent::UserLeft(peer_id) => self.end(SessionEnd::PeerLeft(peer_id)),
        };

        Ok(outputs)
    }

    fn on_peer_key(&mut self, their_id: &str, their_public: &[u8]) -> Result<Vec<PeerOutput>> {
        if self.exchange.has_processed(their_id) {
            debug!("Key from {} already processed", their_id);
            return Ok(Vec::new());
        }

        let own_id = self
            .connection_id
            .as_deref()
            .ok_or_else(|| RustyWhisperError::ConnectionError("not connected".to_string()))?;
        let role = KeyExchangeRole::assign(own_id, their_id);

        let mut outputs = Vec::new();
        match self
            .agreement
            .derive_shared_key(&self.key_pair, their_public, role.is_initiator())
        {
            Ok(key) => {
                self.exchange.mark_processed(their_id);
                self.shared_key = Some(key);
                self.peer_id = Some(their_id.to_string());
                info!("Encryption ready with {} as {:?}", their_id, role);
                outputs.push(PeerOutput::EncryptionReady {
                    peer_id: their_id.to_string(),
                });
            }
            Err(e) => warn!("Key derivation with {} failed: {}", their_id, e),
        }

        // The peer may have announced before we joined
        outputs.push(PeerOutput::Send(self.announce_key()));
        Ok(outputs)
    }

    fn end(&mut self, reason: SessionEnd) -> Vec<PeerOutput> {
        self.shared_key = None;
        self.ended = Some(reason.clone());
        vec![PeerOutput::Ended(reason)]
    }

    fn require_key(&self) -> Result<&[u8]> {
        self.shared_key
            .as_deref()
            .ok_or_else(|| RustyWhisperError::KeyDerivation("no shared key yet".to_string()))
    }

    pub fn encrypt_message(&self, text: &str) -> Result<ClientEvent> {
        let sealed = self.agreement.encrypt(text.as_bytes(), self.require_key()?)?;
        Ok(ClientEvent::SendMessage(MessageSubmission {
            room_id: self.room_id.clone(),
            encrypted: sealed.ciphertext,
            nonce: sealed.nonce,
        }))
    }

    pub fn encrypt_image(
        &self,
        bytes: &[u8],
        name: Option<String>,
        kind: Option<String>,
    ) -> Result<ClientEvent> {
        let sealed = self.agreement.encrypt(bytes, self.require_key()?)?;
        Ok(ClientEvent::SendEncryptedImage(EncryptedImageSubmission {
            room_id: Some(self.room_id.clone()),
            encrypted: Some(sealed.ciphertext),
            nonce: Some(sealed.nonce),
            name,
            kind,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::crypto::testing::XorAgreement;
    use crate::core::message_types::{
        ConnectedPayload, CountdownStarted, EncryptedPayload, PublicKeyAnnouncement,
    };

    fn announcement(event: &ClientEvent, from: &str) -> ServerEvent {
        match event {
            ClientEvent::SendPublicKey(submission) => {
                ServerEvent::ReceivePublicKey(PublicKeyAnnouncement {
                    public_key: submission.public_key.clone(),
                    their_socket_id: from.to_string(),
                })
            }
            other => panic!("not a key announcement: {:?}", other),
        }
    }

    fn relayed(event: ClientEvent) -> ServerEvent {
        match event {
            ClientEvent::SendMessage(submission) => ServerEvent::ReceiveMessage(EncryptedPayload {
                encrypted: submission.encrypted,
                nonce: submission.nonce,
            }),
            other => panic!("not a message: {:?}", other),
        }
    }

    fn paired() -> (PeerSession<XorAgreement>, PeerSession<XorAgreement>) {
        let mut alice = PeerSession::new(XorAgreement::seeded(1), "room").unwrap();
        let mut bob = PeerSession::new(XorAgreement::seeded(50), "room").unwrap();
        alice.on_connected("conn-a");
        bob.on_connected("conn-b");

        let to_bob = announcement(&alice.announce_key(), "conn-a");
        let to_alice = announcement(&bob.announce_key(), "conn-b");
        bob.on_server_event(to_bob).unwrap();
        alice.on_server_event(to_alice).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_connect_joins_and_announces() {
        let mut peer = PeerSession::new(XorAgreement::default(), "room").unwrap();
        assert!(!peer.needs_key_resend());

        let outputs = peer
            .on_server_event(ServerEvent::Connected(ConnectedPayload {
                connection_id: "me".to_string(),
            }))
            .unwrap();
        assert_eq!(
            outputs[0],
            PeerOutput::Send(ClientEvent::JoinRoom(JoinRequest {
                room_id: "room".to_string()
            }))
        );
        assert!(matches!(outputs[1], PeerOutput::Send(ClientEvent::SendPublicKey(_))));
        assert!(peer.needs_key_resend());
    }

    #[test]
    fn test_peers_derive_same_key_and_exchange_messages() {
        let (alice, mut bob) = paired();
        assert!(alice.has_shared_key());
        assert!(!bob.needs_key_resend());
        assert_eq!(bob.peer_id(), Some("conn-a"));

        let outgoing = alice.encrypt_message("meet at noon").unwrap();
        let outputs = bob.on_server_event(relayed(outgoing)).unwrap();
        assert_eq!(outputs, vec![PeerOutput::Message("meet at noon".to_string())]);
    }

    #[test]
    fn test_duplicate_key_is_processed_once() {
        let mut alice = PeerSession::new(XorAgreement::seeded(1), "room").unwrap();
        let bob = PeerSession::new(XorAgreement::seeded(50), "room").unwrap();
        alice.on_connected("conn-a");

        let key = announcement(&bob.announce_key(), "conn-b");
        let first = alice.on_server_event(key.clone()).unwrap();
        assert_eq!(first.len(), 2);
        assert!(matches!(first[0], PeerOutput::EncryptionReady { .. }));
        assert!(matches!(first[1], PeerOutput::Send(ClientEvent::SendPublicKey(_))));

        assert!(alice.on_server_event(key).unwrap().is_empty());
    }

    #[test]
    fn test_failed_derivation_does_not_block_retry() {
        let mut alice = PeerSession::new(XorAgreement::seeded(1), "room").unwrap();
        let bob = PeerSession::new(XorAgreement::seeded(50), "room").unwrap();
        alice.on_connected("conn-a");

        let broken = ServerEvent::ReceivePublicKey(PublicKeyAnnouncement {
            public_key: Vec::new(),
            their_socket_id: "conn-b".to_string(),
        });
        let outputs = alice.on_server_event(broken).unwrap();
        assert!(matches!(
            outputs.as_slice(),
            [PeerOutput::Send(ClientEvent::SendPublicKey(_))]
        ));
        assert!(!alice.has_shared_key());
        assert!(alice.needs_key_resend());

        let outputs = alice
            .on_server_event(announcement(&bob.announce_key(), "conn-b"))
            .unwrap();
        assert_eq!(
            outputs[0],
            PeerOutput::EncryptionReady {
                peer_id: "conn-b".to_string()
            }
        );
        assert!(alice.has_shared_key());
    }

    #[test]
    fn test_leave_ends_the_session() {
        let (mut alice, _bob) = paired();

        assert_eq!(
            alice.leave(),
            ClientEvent::LeaveRoom(LeaveRequest {
                room_id: Some("room".to_string())
            })
        );
        assert!(!alice.has_shared_key());
        assert!(!alice.needs_key_resend());
        assert_eq!(alice.ended(), Some(&SessionEnd::Left));
        assert!(alice
            .on_server_event(ServerEvent::StartChat)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_tampered_message_fails_decryption() {
        let (alice, mut bob) = paired();

        let mut outgoing = alice.encrypt_message("hi").unwrap();
        if let ClientEvent::SendMessage(submission) = &mut outgoing {
            if let Some(tag) = submission.encrypted.last_mut() {
                *tag ^= 0xff;
            }
        }
        assert_eq!(
            bob.on_server_event(relayed(outgoing)),
            Err(RustyWhisperError::DecryptionFailure)
        );
    }

    #[test]
    fn test_encrypt_without_key_is_refused() {
        let peer = PeerSession::new(XorAgreement::default(), "room").unwrap();
        assert!(matches!(
            peer.encrypt_message("too early"),
            Err(RustyWhisperError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_terminal_events_end_the_session() {
        let (mut alice, _bob) = paired();

        let outputs = alice
            .on_server_event(ServerEvent::UserLeft("conn-b".to_string()))
            .unwrap();
        assert_eq!(
            outputs,
            vec![PeerOutput::Ended(SessionEnd::PeerLeft("conn-b".to_string()))]
        );
        assert!(!alice.has_shared_key());
        assert!(!alice.needs_key_resend());

        // Anything after the end is ignored
        assert!(alice
            .on_server_event(ServerEvent::RoomDestructed("gone".to_string()))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_countdown_events_surface() {
        let mut peer = PeerSession::new(XorAgreement::default(), "room").unwrap();
        let outputs = peer
            .on_server_event(ServerEvent::StartInactivityCountdown(CountdownStarted {
                start_time: 1_700_000_000_000,
            }))
            .unwrap();
        assert_eq!(
            outputs,
            vec![PeerOutput::CountdownStarted {
                start_time: 1_700_000_000_000
            }]
        );
        assert_eq!(
            peer.on_server_event(ServerEvent::CancelInactivityCountdown)
                .unwrap(),
            vec![PeerOutput::CountdownCancelled]
        );
    }
}
