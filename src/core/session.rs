use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use warp::ws::Message as WsMessage;

use crate::core::connection::{Connection, ConnectionState};
use crate::error::{Result, RustyWhisperError};

// Manages live client connections and their protocol state
#[derive(Default)]
pub struct SessionManager {
    connections: HashMap<String, Connection>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    // Register a new client connection
    pub fn register(&mut self, id: String, sender: mpsc::UnboundedSender<WsMessage>) -> Result<()> {
        if self.connections.contains_key(&id) {
            return Err(RustyWhisperError::ConnectionError(format!(
                "Connection {} is already registered",
                id
            )));
        }
        let connection = Connection::with_id(id.clone(), sender);
        self.connections.insert(id, connection);
        Ok(())
    }

    // Remove a client connection
    pub fn unregister(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn get_connection(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_connection_mut(&mut self, id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Send one prepared frame to each listed connection except `exclude`
    pub fn send_to_members(
        &self,
        members: &[String],
        exclude: Option<&str>,
        message: &WsMessage,
    ) -> usize {
        members
            .iter()
            .filter(|id| Some(id.as_str()) != exclude)
            .filter_map(|id| self.connections.get(id))
            .filter(|connection| connection.send(message.clone()))
            .count()
    }

    pub fn state_of(&self, id: &str) -> Option<ConnectionState> {
        self.connections.get(id).map(|c| c.state.clone())
    }

    pub fn set_state(&mut self, id: &str, state: ConnectionState) {
        if let Some(connection) = self.connections.get_mut(id) {
            connection.transition(state);
        }
    }

    // Get current clients count
    pub fn client_count(&self) -> usize {
        self.connections.len()
    }
}

// Thread-safe session manager wrapper
pub type Sessions = Arc<Mutex<SessionManager>>;

// Create a new thread-safe session manager
pub fn create_session_manager() -> Sessions {
    Arc::new(Mutex::new(SessionManager::new()))
}

// Acquire the session lock, mapping poisoning into our error type
pub fn lock_sessions(sessions: &Sessions) -> Result<MutexGuard<'_, SessionManager>> {
    Ok(sessions.lock()?)
}
