// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bucketed key-value storage
//!
//! Records are JSON documents grouped in named buckets. Identifiers handed
//! out by [`Store::create`] come from a per-bucket sequence. Listing follows
//! the backend's key order, which is lexicographic on the id string and
//! therefore not chronological once ids reach two digits.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: volatile, for tests and dry runs
//! - [`FileStore`]: one JSON document per bucket in a directory

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{StorageConfig, StorageType};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage backend abstraction
pub trait Store: Send + Sync {
    /// Create `bucket` if it does not exist yet
    fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Fetch one record, `None` when the bucket has no such id
    fn get(&self, bucket: &str, id: &str) -> Result<Option<Value>>;

    /// Visit every record of `bucket` in key order; a visitor error stops the walk
    fn list(&self, bucket: &str, visitor: &mut dyn FnMut(&str, &Value) -> Result<()>)
        -> Result<()>;

    /// Allocate an id, build the record with `factory` and store it
    fn create(&self, bucket: &str, factory: &mut dyn FnMut(&str) -> Result<Value>)
        -> Result<String>;

    /// Store `record` under `id`, replacing any previous record
    fn update(&self, bucket: &str, id: &str, record: Value) -> Result<()>;
}

/// Open the backend selected by the configuration
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn Store>> {
    match config.storage_type {
        StorageType::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageType::File => Ok(Arc::new(FileStore::open(&config.path)?)),
    }
}

/// Content of one bucket, shared by both backends
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Bucket {
    next_id: u64,
    records: BTreeMap<String, Value>,
}

impl Bucket {
    pub(crate) fn get(&self, id: &str) -> Option<Value> {
        self.records.get(id).cloned()
    }

    pub(crate) fn list(&self, visitor: &mut dyn FnMut(&str, &Value) -> Result<()>) -> Result<()> {
        for (id, record) in &self.records {
            visitor(id, record)?;
        }
        Ok(())
    }

    pub(crate) fn create(&mut self, factory: &mut dyn FnMut(&str) -> Result<Value>) -> Result<String> {
        let id = (self.next_id + 1).to_string();
        let record = factory(&id)?;
        self.next_id += 1;
        self.records.insert(id.clone(), record);
        Ok(id)
    }

    pub(crate) fn update(&mut self, id: &str, record: Value) {
        self.records.insert(id.to_string(), record);
    }
}

pub(crate) fn missing_bucket(bucket: &str) -> anyhow::Error {
    anyhow!("Bucket '{}' does not exist", bucket)
}
