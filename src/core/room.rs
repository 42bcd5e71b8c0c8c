use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::MAX_PARTICIPANTS;
use crate::core::grace::PendingDisconnect;
use crate::core::inactivity::InactivityCountdown;
use crate::error::{Result, RustyWhisperError};

/// A pairing room holding at most two participants
#[derive(Debug)]
pub struct Room {
    /// Client-chosen identifier of the room
    pub id: String,
    /// Connection IDs in join order
    participants: Vec<String>,
    /// Timestamp of room creation
    pub created_at: DateTime<Utc>,
    /// Live inactivity countdown, if any
    pub(crate) countdown: Option<InactivityCountdown>,
    /// Disconnected participants waiting out their grace period
    pub(crate) pending_departures: HashMap<String, PendingDisconnect>,
}

impl Room {
    fn new(id: String) -> Self {
        Self {
            id,
            participants: Vec::with_capacity(MAX_PARTICIPANTS),
            created_at: Utc::now(),
            countdown: None,
            pending_departures: HashMap::new(),
        }
    }

    fn add_participant(&mut self, connection_id: &str) -> Result<()> {
        if self.is_full() {
            return Err(RustyWhisperError::RoomFull);
        }
        self.participants.push(connection_id.to_string());
        Ok(())
    }

    fn remove_participant(&mut self, connection_id: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|id| id != connection_id);
        self.pending_departures.remove(connection_id);
        self.participants.len() != before
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn member_count(&self) -> usize {
        self.participants.len()
    }

    pub fn has_member(&self, connection_id: &str) -> bool {
        self.participants.iter().any(|id| id == connection_id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= MAX_PARTICIPANTS
    }

    /// The other participant, if the room is paired
    pub fn peer_of(&self, connection_id: &str) -> Option<&str> {
        self.participants
            .iter()
            .find(|id| id.as_str() != connection_id)
            .map(String::as_str)
    }

    pub fn is_counting_down(&self) -> bool {
        self.countdown.is_some()
    }

    pub fn countdown_started_at(&self) -> Option<DateTime<Utc>> {
        self.countdown.as_ref().map(|countdown| countdown.start_time)
    }

    pub fn has_pending_departure(&self, connection_id: &str) -> bool {
        self.pending_departures.contains_key(connection_id)
    }
}

/// Result of removing a connection from its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room_id: String,
    /// Participants left behind; empty means the room was deleted
    pub remaining: Vec<String>,
}

/// The room table and its membership index.
///
/// Every method here is one atomic registry operation; callers reach it only
/// through [`RoomRegistry::lock`], so a registry mutation and the events it
/// causes can share a critical section.
#[derive(Debug, Default)]
pub struct RoomTable {
    rooms: HashMap<String, Room>,
    /// Connection ID -> room ID
    memberships: HashMap<String, String>,
}

impl RoomTable {
    /// Admit a connection, creating the room if absent
    pub fn join(&mut self, room_id: &str, connection_id: &str) -> Result<Vec<String>> {
        if let Some(current) = self.memberships.get(connection_id) {
            if current != room_id {
                return Err(RustyWhisperError::AlreadyInRoom);
            }
            return Ok(self.participants(room_id));
        }

        let room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string()));
        room.add_participant(connection_id)?;
        let participants = room.participants.clone();

        self.memberships
            .insert(connection_id.to_string(), room_id.to_string());

        Ok(participants)
    }

    /// Remove a connection from whichever room holds it. Empty rooms are deleted.
    pub fn leave(&mut self, connection_id: &str) -> Option<Departure> {
        let room_id = self.memberships.remove(connection_id)?;

        let remaining = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.remove_participant(connection_id);
                room.participants.clone()
            }
            None => Vec::new(),
        };

        if remaining.is_empty() {
            // Dropping the room cancels its countdown and pending departures
            self.rooms.remove(&room_id);
        }

        Some(Departure { room_id, remaining })
    }

    /// Participants of a room, empty if the room does not exist
    pub fn participants(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|room| room.participants.clone())
            .unwrap_or_default()
    }

    /// Remove a room and return it; its timers are cancelled when the value drops
    pub fn take_room(&mut self, room_id: &str) -> Option<Room> {
        let room = self.rooms.remove(room_id)?;
        for member in &room.participants {
            if self.memberships.get(member).map(String::as_str) == Some(room_id) {
                self.memberships.remove(member);
            }
        }
        Some(room)
    }

    /// Idempotent room deletion
    pub fn delete_room(&mut self, room_id: &str) -> bool {
        self.take_room(room_id).is_some()
    }

    pub fn room_of(&self, connection_id: &str) -> Option<&str> {
        self.memberships.get(connection_id).map(String::as_str)
    }

    pub fn get(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub(crate) fn get_mut(&mut self, room_id: &str) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

/// Process-wide owner of all rooms
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    table: Arc<Mutex<RoomTable>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the table. Never hold the guard across an `.await`.
    pub fn lock(&self) -> Result<MutexGuard<'_, RoomTable>> {
        Ok(self.table.lock()?)
    }

    pub fn join(&self, room_id: &str, connection_id: &str) -> Result<Vec<String>> {
        self.lock()?.join(room_id, connection_id)
    }

    pub fn leave(&self, connection_id: &str) -> Result<Option<Departure>> {
        Ok(self.lock()?.leave(connection_id))
    }

    pub fn get_participants(&self, room_id: &str) -> Result<Vec<String>> {
        Ok(self.lock()?.participants(room_id))
    }

    pub fn delete_room(&self, room_id: &str) -> Result<bool> {
        Ok(self.lock()?.delete_room(room_id))
    }

    pub fn room_of(&self, connection_id: &str) -> Result<Option<String>> {
        Ok(self.lock()?.room_of(connection_id).map(str::to_string))
    }

    pub fn contains(&self, room_id: &str) -> Result<bool> {
        Ok(self.lock()?.contains(room_id))
    }

    pub fn room_count(&self) -> Result<usize> {
        Ok(self.lock()?.room_count())
    }
}
