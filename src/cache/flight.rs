use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::METRIC_SINGLEFLIGHT_WAIT;

/// Per-key in-flight guard for cache misses.
///
/// The first caller for a key computes while later callers for the same key
/// wait on the guard; a waiter should re-read the cache once it gets through.
#[derive(Clone, Default)]
pub struct SingleFlight {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        let (guard, waited) = match Arc::clone(&slot).try_lock_owned() {
            Ok(guard) => (guard, false),
            Err(_) => {
                counter!(METRIC_SINGLEFLIGHT_WAIT).increment(1);
                (slot.lock_owned().await, true)
            }
        };

        FlightGuard {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
            waited,
        }
    }

    /// Number of keys that currently have a holder or waiters.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

pub struct FlightGuard {
    key: String,
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
    waited: bool,
}

impl FlightGuard {
    /// Whether another caller held this key when the guard was requested.
    pub fn waited(&self) -> bool {
        self.waited
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map still references the slot once nobody holds or awaits it.
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
