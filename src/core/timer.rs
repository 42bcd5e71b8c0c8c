//! One-shot cancellable timers owned by room state

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a scheduled callback. Dropping an armed handle aborts the task.
#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    /// Run `callback(id)` once after `delay`
    pub fn schedule<F, Fut>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(id).await;
        });

        Self {
            id,
            abort: Some(task.abort_handle()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Disarm without aborting. A firing task calls this on its own handle
    /// so that removing the handle from the room does not cancel it.
    pub fn release(mut self) {
        self.abort = None;
    }

    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.abort.take() {
            handle.abort();
        }
    }
}
