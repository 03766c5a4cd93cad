// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistent storage configuration

use serde::{Deserialize, Serialize};

/// Storage backend configuration
///
/// * `type` - "file" keeps one JSON document per bucket under `path`,
///   "memory" keeps everything in RAM and loses it on restart
/// * `path` - Directory of the file backend (default: "autotester-data")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub storage_type: StorageType,

    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// Storage backend enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Volatile in-memory store
    Memory,
    /// JSON files on disk
    File,
}

fn default_storage_path() -> String {
    "autotester-data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::File,
            path: default_storage_path(),
        }
    }
}
