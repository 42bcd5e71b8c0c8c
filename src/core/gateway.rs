//! Protocol entry point
//!
//! Demultiplexes inbound client events to the room components and reports
//! every failure to the originating connection only. Per connection:
//! `Unjoined -> Joined(room) -> (Left | Destroyed)`.

use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message as WsMessage;

use crate::config::ServerConfig;
use crate::constants::MAX_PARTICIPANTS;
use crate::core::broadcaster::{PayloadLimits, RelayBroadcaster};
use crate::core::connection::ConnectionState;
use crate::core::grace::GracePeriodScheduler;
use crate::core::inactivity::InactivityTimer;
use crate::core::key_exchange::KeyExchangeCoordinator;
use crate::core::message_types::{ClientEvent, ConnectedPayload, ErrorPayload, ServerEvent};
use crate::core::room::RoomRegistry;
use crate::core::session::{create_session_manager, lock_sessions, Sessions};
use crate::error::{Result, RustyWhisperError};

pub struct SessionGateway {
    config: ServerConfig,
    registry: RoomRegistry,
    sessions: Sessions,
    broadcaster: RelayBroadcaster,
    keys: KeyExchangeCoordinator,
    inactivity: InactivityTimer,
    grace: GracePeriodScheduler,
}

impl SessionGateway {
    pub fn new(config: ServerConfig) -> Self {
        let registry = RoomRegistry::new();
        let sessions = create_session_manager();
        let broadcaster = RelayBroadcaster::new(sessions.clone(), PayloadLimits::from(&config));
        let keys = KeyExchangeCoordinator::new(sessions.clone());
        let inactivity =
            InactivityTimer::new(registry.clone(), broadcaster.clone(), config.inactivity_limit);
        let grace =
            GracePeriodScheduler::new(registry.clone(), broadcaster.clone(), config.grace_period);

        Self {
            config,
            registry,
            sessions,
            broadcaster,
            keys,
            inactivity,
            grace,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn inactivity(&self) -> &InactivityTimer {
        &self.inactivity
    }

    pub fn grace(&self) -> &GracePeriodScheduler {
        &self.grace
    }

    pub fn connection_count(&self) -> Result<usize> {
        Ok(lock_sessions(&self.sessions)?.client_count())
    }

    /// Register a transport connection and tell the client its ID
    pub fn connect(&self, sender: mpsc::UnboundedSender<WsMessage>) -> Result<String> {
        let connection_id = Uuid::new_v4().to_string();
        lock_sessions(&self.sessions)?.register(connection_id.clone(), sender)?;

        self.broadcaster.send_to_connection(
            &connection_id,
            &ServerEvent::Connected(ConnectedPayload {
                connection_id: connection_id.clone(),
            }),
        )?;

        info!("Client connected: {}", connection_id);
        Ok(connection_id)
    }

    /// Transport is gone: drop the sender now, settle the room slot after the grace period
    pub fn disconnect(&self, connection_id: &str, reason: &str) -> Result<bool> {
        let removed = lock_sessions(&self.sessions)?.unregister(connection_id);
        if removed.is_none() {
            debug!("Disconnect for unknown connection {}", connection_id);
        }
        info!("Client {} disconnected: {}", connection_id, reason);

        self.grace.schedule(connection_id)
    }

    /// Process one inbound text frame, reporting failures to the sender only
    pub fn handle_text(&self, connection_id: &str, text: &str) {
        if text.len() > self.config.max_frame_bytes {
            warn!(
                "Oversized frame from {}: {} bytes",
                connection_id,
                text.len()
            );
            self.report_error(
                connection_id,
                &RustyWhisperError::OversizePayload {
                    size: text.len(),
                    limit: self.config.max_frame_bytes,
                },
            );
            return;
        }

        let outcome = Self::parse_event(text).and_then(|event| {
            debug!("{} from {}", event.name(), connection_id);
            self.handle_event(connection_id, event)
        });

        if let Err(e) = outcome {
            self.report_error(connection_id, &e);
        }
    }

    fn parse_event(text: &str) -> Result<ClientEvent> {
        serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                RustyWhisperError::InvalidPayload(e.to_string())
            } else {
                RustyWhisperError::MessageParseError(e.to_string())
            }
        })
    }

    pub fn handle_event(&self, connection_id: &str, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::JoinRoom(request) => self.join_room(connection_id, &request.room_id),

            ClientEvent::SendPublicKey(submission) => {
                let table = self.registry.lock()?;
                self.keys.relay_public_key(
                    &table,
                    &submission.room_id,
                    connection_id,
                    submission.public_key,
                )?;
                Ok(())
            }

            ClientEvent::SendMessage(submission) => {
                let table = self.registry.lock()?;
                self.broadcaster.relay_message(
                    &table,
                    &submission.room_id,
                    connection_id,
                    submission.encrypted,
                    submission.nonce,
                )?;
                Ok(())
            }

            ClientEvent::SendEncryptedImage(submission) => {
                let room_id = self.resolve_room(connection_id, submission.room_id.clone())?;
                let table = self.registry.lock()?;
                self.broadcaster
                    .relay_encrypted_image(&table, &room_id, connection_id, submission)?;
                Ok(())
            }

            ClientEvent::ImageMessage(submission) => {
                let room_id = self.resolve_room(connection_id, submission.room_id.clone())?;
                let table = self.registry.lock()?;
                self.broadcaster
                    .relay_legacy_image(&table, &room_id, connection_id, submission)?;
                Ok(())
            }

            ClientEvent::StartInactivityCountdown => {
                match self.current_room(connection_id)? {
                    Some(room_id) => {
                        self.inactivity.start(&room_id)?;
                    }
                    None => debug!("Countdown start from {} outside a room", connection_id),
                }
                Ok(())
            }

            ClientEvent::CancelInactivityCountdown => {
                match self.current_room(connection_id)? {
                    Some(room_id) => {
                        self.inactivity.cancel(&room_id)?;
                    }
                    None => debug!("Countdown cancel from {} outside a room", connection_id),
                }
                Ok(())
            }

            ClientEvent::LeaveRoom(request) => self.leave_room(connection_id, request.room_id),
        }
    }

    fn validate_room_id(&self, room_id: &str) -> Result<()> {
        if room_id.trim().is_empty()
            || room_id.len() > self.config.max_room_id_len
            || room_id.chars().any(char::is_control)
        {
            return Err(RustyWhisperError::InvalidRoomId);
        }
        Ok(())
    }

    fn join_room(&self, connection_id: &str, room_id: &str) -> Result<()> {
        self.validate_room_id(room_id)?;
        if lock_sessions(&self.sessions)?
            .get_connection(connection_id)
            .is_none()
        {
            return Err(RustyWhisperError::SessionNotFound(connection_id.to_string()));
        }

        let mut table = self.registry.lock()?;

        match table.room_of(connection_id).map(str::to_string) {
            Some(current) if current == room_id => {
                debug!("{} is already in room {}", connection_id, room_id);
                return Ok(());
            }
            Some(previous) => {
                info!(
                    "{} switches from room {} to {}",
                    connection_id, previous, room_id
                );
                self.grace.depart_locked(&mut table, connection_id)?;
                lock_sessions(&self.sessions)?.set_state(connection_id, ConnectionState::Left);
            }
            None => {}
        }

        let participants = table.join(room_id, connection_id)?;

        if let Some(connection) = lock_sessions(&self.sessions)?.get_connection_mut(connection_id) {
            connection.enter_room(room_id);
        }

        let text = if participants.len() == 1 {
            format!("{} created the room", connection_id)
        } else {
            format!("{} joined the room", connection_id)
        };
        self.broadcaster.broadcast_system(&table, room_id, &text)?;
        self.broadcaster
            .broadcast_room_update(&table, room_id, &participants)?;
        if participants.len() == MAX_PARTICIPANTS {
            self.broadcaster
                .send_to_room(&table, room_id, None, &ServerEvent::StartChat)?;
        }

        info!(
            "{} joined room {} ({} participant(s))",
            connection_id,
            room_id,
            participants.len()
        );
        Ok(())
    }

    fn leave_room(&self, connection_id: &str, requested: Option<String>) -> Result<()> {
        let mut table = self.registry.lock()?;

        let current = match table.room_of(connection_id) {
            Some(current) => current.to_string(),
            None => {
                debug!("Leave from {} outside a room", connection_id);
                return Ok(());
            }
        };
        if let Some(requested) = requested {
            if requested != current {
                return Err(RustyWhisperError::NotInRoom);
            }
        }

        info!("{} manually left room {}", connection_id, current);
        self.grace.depart_locked(&mut table, connection_id)?;
        lock_sessions(&self.sessions)?.set_state(connection_id, ConnectionState::Left);
        Ok(())
    }

    /// The room a connection currently occupies, read once at the boundary
    fn current_room(&self, connection_id: &str) -> Result<Option<String>> {
        Ok(lock_sessions(&self.sessions)?
            .get_connection(connection_id)
            .and_then(|connection| connection.state.room_id().map(str::to_string)))
    }

    fn resolve_room(&self, connection_id: &str, requested: Option<String>) -> Result<String> {
        match requested {
            Some(room_id) => Ok(room_id),
            None => self
                .current_room(connection_id)?
                .ok_or(RustyWhisperError::NotInRoom),
        }
    }

    fn report_error(&self, connection_id: &str, error: &RustyWhisperError) {
        warn!("Rejected event from {}: {}", connection_id, error);

        let event = match error {
            RustyWhisperError::RoomFull | RustyWhisperError::InvalidRoomId => {
                ServerEvent::JoinError(error.to_string())
            }
            _ => ServerEvent::Error(ErrorPayload {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
        };

        if let Err(e) = self.broadcaster.send_to_connection(connection_id, &event) {
            warn!("Failed to report error to {}: {}", connection_id, e);
        }
    }
}

// Shared reference to the gateway
pub type SharedGateway = Arc<SessionGateway>;
