// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Volatile in-memory store

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::{missing_bucket, Bucket, Store};

/// In-memory [`Store`] backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buckets<T>(&self, f: impl FnOnce(&mut HashMap<String, Bucket>) -> Result<T>) -> Result<T> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| anyhow!("Failed to lock memory store"))?;
        f(&mut buckets)
    }
}

impl Store for MemoryStore {
    fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.with_buckets(|buckets| {
            buckets.entry(bucket.to_string()).or_default();
            Ok(())
        })
    }

    fn get(&self, bucket: &str, id: &str) -> Result<Option<Value>> {
        self.with_buckets(|buckets| {
            Ok(buckets
                .get(bucket)
                .ok_or_else(|| missing_bucket(bucket))?
                .get(id))
        })
    }

    fn list(
        &self,
        bucket: &str,
        visitor: &mut dyn FnMut(&str, &Value) -> Result<()>,
    ) -> Result<()> {
        self.with_buckets(|buckets| {
            buckets
                .get(bucket)
                .ok_or_else(|| missing_bucket(bucket))?
                .list(visitor)
        })
    }

    fn create(
        &self,
        bucket: &str,
        factory: &mut dyn FnMut(&str) -> Result<Value>,
    ) -> Result<String> {
        self.with_buckets(|buckets| {
            buckets
                .get_mut(bucket)
                .ok_or_else(|| missing_bucket(bucket))?
                .create(factory)
        })
    }

    fn update(&self, bucket: &str, id: &str, record: Value) -> Result<()> {
        self.with_buckets(|buckets| {
            buckets
                .get_mut(bucket)
                .ok_or_else(|| missing_bucket(bucket))?
                .update(id, record);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_get_list() {
        let store = MemoryStore::new();
        store.create_bucket("readings").unwrap();

        let first = store
            .create("readings", &mut |id| Ok(json!({ "id": id, "value": 1 })))
            .unwrap();
        let second = store
            .create("readings", &mut |id| Ok(json!({ "id": id, "value": 2 })))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(store.get("readings", &second).unwrap().unwrap()["value"], 2);

        let mut seen = Vec::new();
        store
            .list("readings", &mut |id, _| {
                seen.push(id.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_missing_bucket_and_record() {
        let store = MemoryStore::new();
        assert!(store.get("nope", "1").is_err());
        store.create_bucket("config").unwrap();
        assert_eq!(store.get("config", "1").unwrap(), None);
    }

    #[test]
    fn test_failing_factory_does_not_consume_an_id() {
        let store = MemoryStore::new();
        store.create_bucket("b").unwrap();
        assert!(store
            .create("b", &mut |_| Err(anyhow!("boom")))
            .is_err());
        let id = store.create("b", &mut |_| Ok(json!(null))).unwrap();
        assert_eq!(id, "1");
    }

    #[test]
    fn test_update_overwrites() {
        let store = MemoryStore::new();
        store.create_bucket("config").unwrap();
        store.update("config", "autotester", json!({ "a": 1 })).unwrap();
        store.update("config", "autotester", json!({ "a": 2 })).unwrap();
        assert_eq!(store.get("config", "autotester").unwrap().unwrap()["a"], 2);
    }
}
