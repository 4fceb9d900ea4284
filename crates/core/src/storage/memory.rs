//! In-memory key-value store
//!
//! Individual operations can be made to fail, so callers' store error paths
//! can be exercised without a broken database.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::traits::KeyValueStore;
use crate::error::{Error, Result};

/// Store operations, for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Set,
    Delete,
    GetMany,
}

/// Volatile store backed by a hash map
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    failures: RwLock<HashSet<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every future call of `op` fail
    pub fn fail(&self, op: StoreOp) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(op);
        }
    }

    pub fn recover(&self, op: StoreOp) {
        if let Ok(mut failures) = self.failures.write() {
            failures.remove(&op);
        }
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        let failures = self.failures.read().map_err(|_| Error::StorePoisoned)?;
        if failures.contains(&op) {
            return Err(Error::Injected(format!("{:?}", op)));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.check(StoreOp::Get)?;
        let values = self.values.read().map_err(|_| Error::StorePoisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check(StoreOp::Set)?;
        let mut values = self.values.write().map_err(|_| Error::StorePoisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check(StoreOp::Delete)?;
        let mut values = self.values.write().map_err(|_| Error::StorePoisoned)?;
        values.remove(key);
        Ok(())
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check(StoreOp::GetMany)?;
        let values = self.values.read().map_err(|_| Error::StorePoisoned)?;
        Ok(keys.iter().map(|key| values.get(key).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);

        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn test_memory_store_get_many() {
        let store = MemoryStore::new();
        store.set("b", "2").unwrap();

        let values = store
            .get_many(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(values, [None, Some("2".to_string())]);
    }

    #[test]
    fn test_injected_failure_is_per_operation() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        store.fail(StoreOp::Set);

        assert!(matches!(store.set("k", "w"), Err(Error::Injected(_))));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));

        store.recover(StoreOp::Set);
        store.set("k", "w").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("w"));
    }
}
