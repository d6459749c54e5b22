//! Cancellable grace-period timers.
//!
//! A reconnect inside the grace window must cancel the armed timer, and
//! arming the same key again must supersede the previous timer. The fire
//! handler additionally re-checks live state, so a lost cancellation cannot
//! produce a spurious notification.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Keyed registry of in-flight timer tasks.
pub struct TimerRegistry<K> {
    tasks: Mutex<HashMap<K, JoinHandle<()>>>,
}

impl<K: Eq + Hash + Clone> TimerRegistry<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register `task` under `key`, aborting any timer already armed there.
    pub fn arm(&self, key: K, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.insert(key, task) {
            previous.abort();
        }
    }

    /// Abort and forget the timer for `key`. `false` if none was armed.
    pub fn cancel(&self, key: &K) -> bool {
        match self.tasks.lock().remove(key) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Drop the bookkeeping entry without aborting. Called by a timer task
    /// that reached its fire point.
    pub fn discard(&self, key: &K) {
        let _ = self.tasks.lock().remove(key);
    }

    /// Whether a timer is currently armed for `key`.
    pub fn is_armed(&self, key: &K) -> bool {
        self.tasks.lock().contains_key(key)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no timers are armed.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// The two grace-timer families the session engine owns.
pub struct GraceTimers {
    /// Presence-offline timers keyed by uid.
    pub presence: TimerRegistry<u64>,
    /// Token-channel disconnect timers keyed by `(channel, uid)`.
    pub token_channel: TimerRegistry<(String, u64)>,
}

impl GraceTimers {
    /// Create empty registries.
    pub fn new() -> Self {
        Self {
            presence: TimerRegistry::new(),
            token_channel: TimerRegistry::new(),
        }
    }
}

impl Default for GraceTimers {
    fn default() -> Self {
        Self::new()
    }
}
