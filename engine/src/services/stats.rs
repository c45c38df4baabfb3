use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

/// In-memory counters bumped by the `updateStats` action, keyed by trigger.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    counters: Mutex<HashMap<String, u64>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter, returning the new value
    pub fn increment(&self, name: &str) -> u64 {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
