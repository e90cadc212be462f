//! Per application environment run guard

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::models::deployment::RunKey;

/// Tracks which application environments have a run in flight
#[derive(Debug, Default)]
pub struct RunGuard {
    busy: Mutex<HashSet<RunKey>>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` busy; returns false if it already was
    pub fn try_acquire(&self, key: &RunKey) -> bool {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        let acquired = busy.insert(key.clone());
        debug!("Run slot {} acquire: {}", key, acquired);
        acquired
    }

    /// Free `key`. Releasing a free key is a no-op.
    pub fn release(&self, key: &RunKey) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(key);
        debug!("Run slot {} released", key);
    }

    pub fn is_busy(&self, key: &RunKey) -> bool {
        let busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        busy.contains(key)
    }

    /// Busy keys, sorted
    pub fn active(&self) -> Vec<RunKey> {
        let busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<RunKey> = busy.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Acquire `key` and return a slot that releases it when dropped
    pub fn claim(self: &Arc<Self>, key: RunKey) -> Option<RunSlot> {
        if self.try_acquire(&key) {
            Some(RunSlot {
                guard: self.clone(),
                key,
            })
        } else {
            None
        }
    }
}

/// A held run slot. Dropping it releases the key, including during unwinding.
#[derive(Debug)]
pub struct RunSlot {
    guard: Arc<RunGuard>,
    key: RunKey,
}

impl RunSlot {
    pub fn key(&self) -> &RunKey {
        &self.key
    }
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.guard.release(&self.key);
    }
}
