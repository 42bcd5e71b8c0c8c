//! Per-room countdown to destruction
//!
//! `Idle -> Counting -> {Cancelled -> Idle, Expired -> Destroyed}`.
//! The countdown lives inside its [`Room`](crate::core::room::Room), so
//! deleting the room also cancels it.

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::Instant;

use crate::core::broadcaster::{DestroyReason, RelayBroadcaster};
use crate::core::message_types::{CountdownStarted, ServerEvent};
use crate::core::room::{RoomRegistry, RoomTable};
use crate::core::timer::TimerHandle;
use crate::error::Result;

#[derive(Debug)]
pub struct InactivityCountdown {
    pub start_time: DateTime<Utc>,
    pub deadline: Instant,
    handle: TimerHandle,
}

impl InactivityCountdown {
    pub fn timer_id(&self) -> u64 {
        self.handle.id()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn release(self) {
        self.handle.release();
    }
}

#[derive(Clone)]
pub struct InactivityTimer {
    registry: RoomRegistry,
    broadcaster: RelayBroadcaster,
    limit: Duration,
}

impl InactivityTimer {
    pub fn new(registry: RoomRegistry, broadcaster: RelayBroadcaster, limit: Duration) -> Self {
        Self {
            registry,
            broadcaster,
            limit,
        }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Arm the countdown for a room. No-op if the room is absent or already counting.
    pub fn start(&self, room_id: &str) -> Result<bool> {
        let mut table = self.registry.lock()?;
        self.start_locked(&mut table, room_id)
    }

    pub fn start_locked(&self, table: &mut RoomTable, room_id: &str) -> Result<bool> {
        let room = match table.get_mut(room_id) {
            Some(room) => room,
            None => {
                debug!("Countdown requested for unknown room {}", room_id);
                return Ok(false);
            }
        };
        if room.countdown.is_some() {
            debug!("Countdown already running in room {}", room_id);
            return Ok(false);
        }

        let start_time = Utc::now();
        let timer = self.clone();
        let expiring_room = room_id.to_string();
        let handle = TimerHandle::schedule(self.limit, move |timer_id| async move {
            if let Err(e) = timer.expire(&expiring_room, timer_id) {
                error!("Inactivity expiry failed for room {}: {}", expiring_room, e);
            }
        });

        room.countdown = Some(InactivityCountdown {
            start_time,
            deadline: Instant::now() + self.limit,
            handle,
        });

        let event = ServerEvent::StartInactivityCountdown(CountdownStarted {
            start_time: start_time.timestamp_millis(),
        });
        self.broadcaster
            .send_to_members(room.participants(), None, &event)?;

        info!("Inactivity countdown started in room {}", room_id);
        Ok(true)
    }

    /// Disarm the countdown. No-op if none is running.
    pub fn cancel(&self, room_id: &str) -> Result<bool> {
        let mut table = self.registry.lock()?;
        let room = match table.get_mut(room_id) {
            Some(room) => room,
            None => return Ok(false),
        };

        // Dropping the countdown aborts its timer task
        if room.countdown.take().is_none() {
            return Ok(false);
        }

        self.broadcaster.send_to_members(
            room.participants(),
            None,
            &ServerEvent::CancelInactivityCountdown,
        )?;

        info!("Inactivity countdown cancelled in room {}", room_id);
        Ok(true)
    }

    /// Timer callback. A stale `timer_id` or missing room is a silent no-op.
    pub fn expire(&self, room_id: &str, timer_id: u64) -> Result<bool> {
        let mut table = self.registry.lock()?;

        let countdown = match table.get_mut(room_id) {
            Some(room)
                if room.countdown.as_ref().map(InactivityCountdown::timer_id) == Some(timer_id) =>
            {
                room.countdown.take()
            }
            _ => None,
        };
        match countdown {
            Some(countdown) => countdown.release(),
            None => {
                debug!("Stale inactivity timer {} for room {} ignored", timer_id, room_id);
                return Ok(false);
            }
        }

        info!("Room {} destroyed due to inactivity", room_id);
        self.broadcaster
            .destroy_room(&mut table, room_id, &DestroyReason::Inactivity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::broadcaster::PayloadLimits;
    use crate::core::session::{create_session_manager, lock_sessions};
    use tokio::sync::mpsc;
    use warp::ws::Message;

    fn setup() -> (
        RoomRegistry,
        InactivityTimer,
        mpsc::UnboundedReceiver<Message>,
    ) {
        let registry = RoomRegistry::new();
        let sessions = create_session_manager();
        let (tx, rx) = mpsc::unbounded_channel();
        lock_sessions(&sessions)
            .unwrap()
            .register("a".to_string(), tx)
            .unwrap();
        registry.join("r", "a").unwrap();

        let broadcaster = RelayBroadcaster::new(
            sessions,
            PayloadLimits {
                max_encrypted_bytes: 1024,
                max_legacy_image_bytes: 512,
            },
        );
        let timer = InactivityTimer::new(registry.clone(), broadcaster, Duration::from_secs(600));
        (registry, timer, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(message) = rx.try_recv() {
            events.push(serde_json::from_str(message.to_str().unwrap()).unwrap());
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_destroys_room_once() {
        let (registry, timer, mut rx) = setup();

        assert!(timer.start("r").unwrap());
        assert!(!timer.start("r").unwrap());

        tokio::time::sleep(Duration::from_secs(601)).await;

        assert!(!registry.contains("r").unwrap());
        let events = drain(&mut rx);
        assert!(matches!(events[0], ServerEvent::StartInactivityCountdown(_)));
        let destroyed = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::RoomDestructed(_)))
            .count();
        assert_eq!(destroyed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_destruction() {
        let (registry, timer, mut rx) = setup();

        assert!(timer.start("r").unwrap());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(timer.cancel("r").unwrap());
        assert!(!timer.cancel("r").unwrap());

        tokio::time::sleep(Duration::from_secs(900)).await;

        assert!(registry.contains("r").unwrap());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], ServerEvent::CancelInactivityCountdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_cancel_gets_fresh_deadline() {
        let (registry, timer, _rx) = setup();

        timer.start("r").unwrap();
        tokio::time::sleep(Duration::from_secs(500)).await;
        timer.cancel("r").unwrap();
        timer.start("r").unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(registry.contains("r").unwrap());

        tokio::time::sleep(Duration::from_secs(401)).await;
        assert!(!registry.contains("r").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_id_is_ignored() {
        let (registry, timer, _rx) = setup();
        timer.start("r").unwrap();

        assert!(!timer.expire("r", u64::MAX).unwrap());
        assert!(registry.contains("r").unwrap());
        assert!(!timer.expire("missing", 1).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_on_unknown_room_is_noop() {
        let (_registry, timer, mut rx) = setup();
        assert!(!timer.start("nowhere").unwrap());
        assert!(drain(&mut rx).is_empty());
    }
}
