//! Two-speed state: a single-slot latest value read every render tick, and
//! a time gate for the slower published snapshot.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Minimum spacing of published snapshots (~4 Hz)
pub const PUBLISH_INTERVAL: Duration = Duration::from_millis(250);

/// Most recent value wins; readers never see a queue.
pub struct LatestCell<T> {
    slot: Arc<Mutex<Option<Arc<T>>>>,
}

impl<T> Clone for LatestCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for LatestCell<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> LatestCell<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, value: T) {
        *self.slot.lock().unwrap() = Some(Arc::new(value));
    }

    /// Current value; stays available until overwritten or cleared.
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.slot.lock().unwrap().take();
    }
}

/// Elapsed-time gate for throttled publication
#[derive(Debug, Clone)]
pub struct PublishGate {
    interval: Duration,
    last: Option<Instant>,
}

impl PublishGate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True (and re-armed) when at least `interval` passed since the last publish
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Record an out-of-band publish (e.g. a connection flag change)
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

impl Default for PublishGate {
    fn default() -> Self {
        Self::new(PUBLISH_INTERVAL)
    }
}
