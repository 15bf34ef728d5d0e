use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

struct Timer {
    generation: u64,
    handle: AbortHandle,
    fired: bool,
}

/// Deferred dispatch triggers, one per order id.
///
/// A timer can be revoked with [`DispatchScheduler::disarm`] until it fires.
/// Once fired, the task it runs is never aborted; it stays registered until
/// it finishes so [`DispatchScheduler::drain`] can wait for it.
#[derive(Clone, Default)]
pub struct DispatchScheduler {
    timers: Arc<Mutex<HashMap<String, Timer>>>,
    generations: Arc<AtomicU64>,
}

impl DispatchScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` once after `delay`, replacing any timer armed for `key`.
    pub fn arm<F>(&self, key: &str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let owned_key = key.to_string();

        // Held across spawn so the task cannot look itself up before it is registered.
        let mut guard = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = timers.lock().unwrap_or_else(PoisonError::into_inner);
                match timers.get_mut(&owned_key) {
                    Some(timer) if timer.generation == generation => timer.fired = true,
                    _ => return,
                }
            }
            task.await;
            let mut timers = timers.lock().unwrap_or_else(PoisonError::into_inner);
            if timers
                .get(&owned_key)
                .is_some_and(|t| t.generation == generation)
            {
                timers.remove(&owned_key);
            }
        });
        let previous = guard.insert(
            key.to_string(),
            Timer {
                generation,
                handle: join.abort_handle(),
                fired: false,
            },
        );
        if let Some(previous) = previous
            && !previous.fired
        {
            previous.handle.abort();
        }
        debug!(key, delay_secs = delay.as_secs(), "dispatch timer armed");
    }

    /// Revokes the timer for `key`. Returns `true` if a timer that had not
    /// fired yet was cancelled.
    pub fn disarm(&self, key: &str) -> bool {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        match timers.get(key) {
            Some(timer) if !timer.fired => {
                timer.handle.abort();
                timers.remove(key);
                debug!(key, "dispatch timer disarmed");
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|t| !t.fired)
    }

    /// Timers still armed or running.
    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Waits until every armed timer has fired and finished.
    pub async fn drain(&self) {
        while self.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Cancels all timers that have not fired yet.
    pub fn shutdown(&self) -> usize {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = timers.len();
        timers.retain(|_, timer| {
            if !timer.fired {
                timer.handle.abort();
            }
            timer.fired
        });
        before - timers.len()
    }
}
