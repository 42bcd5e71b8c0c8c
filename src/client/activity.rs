//! Idle detection and countdown display for an endpoint

use std::time::{Duration, Instant};

use crate::constants::IDLE_AFTER_MS;
use crate::core::message_types::ClientEvent;

/// Tracks local user activity and decides when to ask the server to start
/// or cancel the room's inactivity countdown.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    idle_after: Duration,
    last_activity: Instant,
    idle: bool,
}

impl ActivityMonitor {
    pub fn new(now: Instant) -> Self {
        Self::with_idle_after(Duration::from_millis(IDLE_AFTER_MS), now)
    }

    pub fn with_idle_after(idle_after: Duration, now: Instant) -> Self {
        Self {
            idle_after,
            last_activity: now,
            idle: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Input seen. Leaving the idle state cancels the countdown.
    pub fn record_activity(&mut self, now: Instant) -> Option<ClientEvent> {
        self.last_activity = now;
        if self.idle {
            self.idle = false;
            return Some(ClientEvent::CancelInactivityCountdown);
        }
        None
    }

    /// Call periodically. Emits the start request once per idle stretch.
    pub fn poll(&mut self, now: Instant) -> Option<ClientEvent> {
        if !self.idle && now.saturating_duration_since(self.last_activity) >= self.idle_after {
            self.idle = true;
            return Some(ClientEvent::StartInactivityCountdown);
        }
        None
    }
}

/// Remaining countdown time measured from the server's start timestamp, so
/// every endpoint shows the same value regardless of delivery latency.
pub fn countdown_remaining(start_time_ms: i64, now_ms: i64, limit: Duration) -> Duration {
    let elapsed = Duration::from_millis(now_ms.saturating_sub(start_time_ms).max(0) as u64);
    limit.saturating_sub(elapsed)
}

/// `m:ss`, rounding partial seconds up
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_millis().div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}
