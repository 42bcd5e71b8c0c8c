//! Deferred disconnect processing
//!
//! A transport drop does not touch room state right away. The departure is
//! parked in the room for a grace period and only then settled. A room that
//! loses either party is torn down: a two-party session cannot continue with
//! one participant.
//!
//! The grace period does not preserve identity. A client that reconnects gets
//! a new connection ID and cannot reclaim its old slot.

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::time::Duration;

use crate::core::broadcaster::{DestroyReason, RelayBroadcaster};
use crate::core::message_types::ServerEvent;
use crate::core::room::{Departure, RoomRegistry, RoomTable};
use crate::core::timer::TimerHandle;
use crate::error::Result;

#[derive(Debug)]
pub struct PendingDisconnect {
    pub connection_id: String,
    pub room_id: String,
    pub scheduled_at: DateTime<Utc>,
    handle: TimerHandle,
}

impl PendingDisconnect {
    pub fn timer_id(&self) -> u64 {
        self.handle.id()
    }
}

#[derive(Clone)]
pub struct GracePeriodScheduler {
    registry: RoomRegistry,
    broadcaster: RelayBroadcaster,
    grace: Duration,
}

impl GracePeriodScheduler {
    pub fn new(registry: RoomRegistry, broadcaster: RelayBroadcaster, grace: Duration) -> Self {
        Self {
            registry,
            broadcaster,
            grace,
        }
    }

    /// Park the departure of a disconnected connection.
    ///
    /// Returns false when the connection holds no room slot (nothing to settle)
    /// or a departure is already pending for it.
    pub fn schedule(&self, connection_id: &str) -> Result<bool> {
        let mut table = self.registry.lock()?;

        let room_id = match table.room_of(connection_id) {
            Some(room_id) => room_id.to_string(),
            None => return Ok(false),
        };
        let room = match table.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(false),
        };
        if room.has_pending_departure(connection_id) {
            return Ok(false);
        }

        let scheduler = self.clone();
        let departing = connection_id.to_string();
        let departing_from = room_id.clone();
        let handle = TimerHandle::schedule(self.grace, move |timer_id| async move {
            if let Err(e) = scheduler.fire(&departing, &departing_from, timer_id) {
                error!("Grace period processing failed for {}: {}", departing, e);
            }
        });

        room.pending_departures.insert(
            connection_id.to_string(),
            PendingDisconnect {
                connection_id: connection_id.to_string(),
                room_id: room_id.clone(),
                scheduled_at: Utc::now(),
                handle,
            },
        );

        debug!(
            "Departure of {} from room {} deferred by {:?}",
            connection_id, room_id, self.grace
        );
        Ok(true)
    }

    /// Timer callback. A stale `timer_id` or vanished room is a silent no-op.
    pub fn fire(
        &self,
        connection_id: &str,
        room_id: &str,
        timer_id: u64,
    ) -> Result<Option<Departure>> {
        let mut table = self.registry.lock()?;

        let pending = match table.get_mut(room_id) {
            Some(room)
                if room
                    .pending_departures
                    .get(connection_id)
                    .map(PendingDisconnect::timer_id)
                    == Some(timer_id) =>
            {
                room.pending_departures.remove(connection_id)
            }
            _ => None,
        };
        match pending {
            Some(pending) => pending.handle.release(),
            None => {
                debug!(
                    "Stale grace timer {} for {} in room {} ignored",
                    timer_id, connection_id, room_id
                );
                return Ok(None);
            }
        }

        info!("Grace period elapsed for {}", connection_id);
        self.depart_locked(&mut table, connection_id)
    }

    /// Settle a departure immediately
    pub fn depart(&self, connection_id: &str) -> Result<Option<Departure>> {
        let mut table = self.registry.lock()?;
        self.depart_locked(&mut table, connection_id)
    }

    /// Remove the connection from its room and apply the two-party policy
    pub fn depart_locked(
        &self,
        table: &mut RoomTable,
        connection_id: &str,
    ) -> Result<Option<Departure>> {
        let departure = match table.leave(connection_id) {
            Some(departure) => departure,
            None => return Ok(None),
        };

        if departure.remaining.is_empty() {
            info!(
                "No users left in room {}, room deleted",
                departure.room_id
            );
            return Ok(Some(departure));
        }

        let remaining = &departure.remaining;
        self.broadcaster.send_to_members(
            remaining,
            None,
            &ServerEvent::SystemMessage(format!("{} left the room", connection_id)),
        )?;
        self.broadcaster
            .send_to_members(remaining, None, &ServerEvent::RoomUpdate(remaining.clone()))?;
        self.broadcaster.send_to_members(
            remaining,
            None,
            &ServerEvent::UserLeft(connection_id.to_string()),
        )?;

        info!(
            "Room {} destroyed because {} left",
            departure.room_id, connection_id
        );
        self.broadcaster.destroy_room(
            table,
            &departure.room_id,
            &DestroyReason::PeerLeft {
                left_user_id: connection_id.to_string(),
            },
        )?;

        Ok(Some(departure))
    }
}
