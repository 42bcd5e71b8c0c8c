//! WebSocket connection management
//! Handles the lifecycle of client connections

use log::warn;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::Message;

use crate::core::key_exchange::KeyExchangeState;

/// Position of a connection in the room protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unjoined,
    Joined(String),
    /// Left its room voluntarily
    Left,
    /// Evicted because its room was destroyed
    Destroyed,
}

impl ConnectionState {
    pub fn room_id(&self) -> Option<&str> {
        match self {
            Self::Joined(room_id) => Some(room_id),
            _ => None,
        }
    }
}

/// Represents the state of a single WebSocket connection
pub struct Connection {
    pub id: String,
    pub sender: mpsc::UnboundedSender<Message>,
    pub connected_at: Instant,
    pub state: ConnectionState,
    /// Last public key this connection announced
    pub announced_key: Option<Vec<u8>>,
    pub key_exchange: KeyExchangeState,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), sender)
    }

    pub fn with_id(id: String, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            sender,
            connected_at: Instant::now(),
            state: ConnectionState::Unjoined,
            announced_key: None,
            key_exchange: KeyExchangeState::default(),
        }
    }

    /// Send a text message through this connection
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Message::text(text))
    }

    /// Send a prepared frame through this connection
    pub fn send(&self, message: Message) -> bool {
        match self.sender.send(message) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send message to client {}", self.id);
                false
            }
        }
    }

    /// Move to another protocol state. Announced keys and key-exchange
    /// progress belong to one room and are dropped whenever the room changes.
    pub fn transition(&mut self, state: ConnectionState) {
        if self.state.room_id() != state.room_id() {
            self.announced_key = None;
            self.key_exchange = KeyExchangeState::default();
        }
        self.state = state;
    }

    pub fn enter_room(&mut self, room_id: &str) {
        self.transition(ConnectionState::Joined(room_id.to_string()));
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
