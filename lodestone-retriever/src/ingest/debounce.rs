//! Per-key event debouncing.
//!
//! Editors and build tools commonly write a file several times within a few
//! hundred milliseconds. [`KeyedDebouncer`] collapses such bursts: each
//! `debounce` call for a key cancels the key's pending action and schedules
//! a fresh one, so only the last event in a burst fires, `delay` after the
//! burst goes quiet. Different keys never interfere with each other.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

pub struct KeyedDebouncer<K> {
    delay: Duration,
    pending: Arc<Mutex<HashMap<K, JoinHandle<()>>>>,
}

impl<K> KeyedDebouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule `action` to run after the delay, cancelling any action
    /// already pending for the same key.
    pub fn debounce<F>(&self, key: K, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Deregister before running so a slow action does not block
            // re-scheduling of the same key
            if let Ok(mut map) = pending.lock() {
                map.remove(&task_key);
            }
            action.await;
        });

        if let Ok(mut map) = self.pending.lock()
            && let Some(previous) = map.insert(key, handle)
        {
            previous.abort();
        }
    }

    /// Number of keys with an action still pending.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Abort every pending action.
    pub fn cancel_all(&self) {
        if let Ok(mut map) = self.pending.lock() {
            for (_, handle) in map.drain() {
                handle.abort();
            }
        }
    }
}

impl<K> Drop for KeyedDebouncer<K> {
    fn drop(&mut self) {
        if let Ok(mut map) = self.pending.lock() {
            for (_, handle) in map.drain() {
                handle.abort();
            }
        }
    }
}
