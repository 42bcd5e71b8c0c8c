//! Key-exchange role assignment and public key relay
//!
//! Roles are derived from the two connection IDs alone, so the peers never
//! negotiate: the ID that sorts second is the initiator. The primitive each
//! endpoint calls takes that flag, and the flags must differ on the two
//! sides for both to derive the same shared secret.

use log::debug;

use crate::core::broadcaster::encode_event;
use crate::core::message_types::{PublicKeyAnnouncement, ServerEvent};
use crate::core::room::RoomTable;
use crate::core::session::{lock_sessions, Sessions};
use crate::error::{Result, RustyWhisperError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeRole {
    Initiator,
    Responder,
}

impl KeyExchangeRole {
    /// Role of `local` when paired with `remote`
    pub fn assign(local: &str, remote: &str) -> Self {
        if local > remote {
            Self::Initiator
        } else {
            Self::Responder
        }
    }

    pub fn is_initiator(self) -> bool {
        self == Self::Initiator
    }
}

/// Remembers whose key a connection has already processed
#[derive(Debug, Clone, Default)]
pub struct KeyExchangeState {
    last_processed_peer_key_from: Option<String>,
}

impl KeyExchangeState {
    /// True the first time a key from `remote` arrives; records it
    pub fn should_process(&mut self, remote: &str) -> bool {
        if self.has_processed(remote) {
            return false;
        }
        self.mark_processed(remote);
        true
    }

    pub fn mark_processed(&mut self, remote: &str) {
        self.last_processed_peer_key_from = Some(remote.to_string());
    }

    pub fn has_processed(&self, remote: &str) -> bool {
        self.last_processed_peer_key_from.as_deref() == Some(remote)
    }

    pub fn last_processed(&self) -> Option<&str> {
        self.last_processed_peer_key_from.as_deref()
    }
}

/// What a single announcement caused
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyRelay {
    /// The peer received the sender's key
    pub delivered: bool,
    /// The sender received the peer's cached key in return
    pub reannounced: bool,
}

#[derive(Clone)]
pub struct KeyExchangeCoordinator {
    sessions: Sessions,
}

impl KeyExchangeCoordinator {
    pub fn new(sessions: Sessions) -> Self {
        Self { sessions }
    }

    /// Forward the sender's public key to the other room member only
    pub fn relay_public_key(
        &self,
        table: &RoomTable,
        room_id: &str,
        sender_id: &str,
        public_key: Vec<u8>,
    ) -> Result<KeyRelay> {
        if public_key.is_empty() {
            return Err(RustyWhisperError::InvalidPayload(
                "publicKey must not be empty".to_string(),
            ));
        }

        let room = table.get(room_id).ok_or(RustyWhisperError::NotInRoom)?;
        if !room.has_member(sender_id) {
            return Err(RustyWhisperError::NotInRoom);
        }

        let mut sessions = lock_sessions(&self.sessions)?;
        if let Some(sender) = sessions.get_connection_mut(sender_id) {
            sender.announced_key = Some(public_key.clone());
        }

        let peer_id = match room.peer_of(sender_id) {
            Some(peer_id) => peer_id.to_string(),
            None => {
                debug!("Cached key from {} until a peer joins {}", sender_id, room_id);
                return Ok(KeyRelay::default());
            }
        };

        let mut outcome = KeyRelay::default();
        let mut peer_key = None;

        if let Some(peer) = sessions.get_connection_mut(&peer_id) {
            if !peer.key_exchange.should_process(sender_id) {
                debug!("Duplicate key from {} for {} ignored", sender_id, peer_id);
                return Ok(outcome);
            }

            let announcement = ServerEvent::ReceivePublicKey(PublicKeyAnnouncement {
                public_key,
                their_socket_id: sender_id.to_string(),
            });
            outcome.delivered = peer.send(encode_event(&announcement)?);
            peer_key = peer.announced_key.clone();
        }

        // First delivery to the peer: hand the sender the peer's key as well
        if let (true, Some(peer_key)) = (outcome.delivered, peer_key) {
            if let Some(sender) = sessions.get_connection_mut(sender_id) {
                if sender.key_exchange.should_process(&peer_id) {
                    let announcement = ServerEvent::ReceivePublicKey(PublicKeyAnnouncement {
                        public_key: peer_key,
                        their_socket_id: peer_id.clone(),
                    });
                    outcome.reannounced = sender.send(encode_event(&announcement)?);
                }
            }
        }

        debug!(
            "Key from {} in room {}: delivered={}, reannounced={}",
            sender_id, room_id, outcome.delivered, outcome.reannounced
        );
        Ok(outcome)
    }
}
