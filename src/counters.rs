//! Named counters kept in their own partition

use crate::core::Result;
use crate::storage::PartitionRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const COUNTERS_PARTITION: &str = "counters";

/// Map from counter name to value. Stored as a plain JSON object.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterBook {
    counters: Mutex<BTreeMap<String, i64>>,
}

impl CounterBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(registry: &PartitionRegistry) -> Result<()> {
        registry.register(COUNTERS_PARTITION, "counters.json", CounterBook::new)
    }

    /// Add `by` (which may be negative) and return the new value.
    pub fn increment(&self, name: &str, by: i64) -> Result<i64> {
        let mut counters = self.counters.lock()?;
        let value = counters.entry(name.to_string()).or_insert(0);
        *value = value.saturating_add(by);
        Ok(*value)
    }

    /// Current value, zero for counters never touched.
    pub fn get(&self, name: &str) -> Result<i64> {
        Ok(self.counters.lock()?.get(name).copied().unwrap_or(0))
    }

    /// Drop a counter, returning its last value.
    pub fn reset(&self, name: &str) -> Result<Option<i64>> {
        Ok(self.counters.lock()?.remove(name))
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, i64>> {
        Ok(self.counters.lock()?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_increment_and_get() {
        let book = CounterBook::new();
        assert_eq!(book.get("hugs").unwrap(), 0);
        assert_eq!(book.increment("hugs", 1).unwrap(), 1);
        assert_eq!(book.increment("hugs", 4).unwrap(), 5);
        assert_eq!(book.increment("hugs", -2).unwrap(), 3);
        assert_eq!(book.get("hugs").unwrap(), 3);
    }

    #[test]
    fn test_reset() {
        let book = CounterBook::new();
        book.increment("coffee", 2).unwrap();
        assert_eq!(book.reset("coffee").unwrap(), Some(2));
        assert_eq!(book.reset("coffee").unwrap(), None);
        assert_eq!(book.get("coffee").unwrap(), 0);
    }

    #[test]
    fn test_serialized_as_plain_object() {
        let book = CounterBook::new();
        book.increment("a", 2).unwrap();
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json, serde_json::json!({ "a": 2 }));

        let loaded: CounterBook = serde_json::from_value(json).unwrap();
        assert_eq!(loaded.get("a").unwrap(), 2);
    }

    #[test]
    fn test_concurrent_increments() {
        let book = Arc::new(CounterBook::new());
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let book = book.clone();
                scope.spawn(move || {
                    for _ in 0..250 {
                        book.increment("clicks", 1).unwrap();
                    }
                });
            }
        });
        assert_eq!(book.get("clicks").unwrap(), 2000);
    }
}
