// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JSON file store
//!
//! Each bucket lives in `<directory>/<bucket>.json`. The whole store is kept
//! in memory and a bucket file is rewritten after every mutation of that
//! bucket (write to a temporary file, then rename).
//!
//! A mutation clones the bucket and rewrites its whole file with blocking
//! I/O while holding the store lock, so its cost grows with the number of
//! records in the bucket. Readings only ever grow; async callers go through
//! [`ResultStore::append_blocking`](crate::autotester::ResultStore::append_blocking)
//! so the rewrite runs on the blocking pool.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde_json::Value;

use super::{missing_bucket, Bucket, Store};

/// File-backed [`Store`]
#[derive(Debug)]
pub struct FileStore {
    directory: PathBuf,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl FileStore {
    /// Open (or create) a store in `directory`, loading every bucket file
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create store directory {:?}", directory))?;

        let mut buckets = HashMap::new();
        for entry in fs::read_dir(&directory)
            .with_context(|| format!("Failed to read store directory {:?}", directory))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read bucket file {:?}", path))?;
            let bucket: Bucket = serde_json::from_str(&contents)
                .with_context(|| format!("Corrupted bucket file {:?}", path))?;
            debug!("Loaded bucket '{}' from {:?}", name, path);
            buckets.insert(name.to_string(), bucket);
        }

        Ok(Self {
            directory,
            buckets: Mutex::new(buckets),
        })
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.directory.join(format!("{}.json", bucket))
    }

    fn persist(&self, name: &str, bucket: &Bucket) -> Result<()> {
        let path = self.bucket_path(name);
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(bucket)
            .with_context(|| format!("Failed to serialize bucket '{}'", name))?;
        fs::write(&tmp, contents).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("Failed to replace {:?}", path))?;
        Ok(())
    }

    fn with_buckets<T>(&self, f: impl FnOnce(&mut HashMap<String, Bucket>) -> Result<T>) -> Result<T> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| anyhow!("Failed to lock file store"))?;
        f(&mut buckets)
    }

    fn mutate<T>(&self, name: &str, f: impl FnOnce(&mut Bucket) -> Result<T>) -> Result<T> {
        self.with_buckets(|buckets| {
            let bucket = buckets.get_mut(name).ok_or_else(|| missing_bucket(name))?;
            let mut updated = bucket.clone();
            let out = f(&mut updated)?;
            // Only commit in memory once the file is written
            self.persist(name, &updated)?;
            *bucket = updated;
            Ok(out)
        })
    }
}

impl Store for FileStore {
    fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.with_buckets(|buckets| {
            if !buckets.contains_key(bucket) {
                let empty = Bucket::default();
                self.persist(bucket, &empty)?;
                buckets.insert(bucket.to_string(), empty);
            }
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
        self.mutate(bucket, |b| b.create(factory))
    }

    fn update(&self, bucket: &str, id: &str, record: Value) -> Result<()> {
        self.mutate(bucket, |b| {
            b.update(id, record);
            Ok(())
        })
    }
}
