// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Persistence of the configuration record and of readings

use std::sync::Arc;

use log::{debug, info, warn};

use super::model::{AutoTesterConfig, Parameter, Reading, ResultPoint, CONFIG_RECORD_ID};
use crate::error::AutoTesterError;
use crate::storage::Store;

/// Bucket holding the singleton configuration record
pub const CONFIG_BUCKET: &str = "autotester";
/// Bucket holding the readings
pub const READINGS_BUCKET: &str = "autotester_readings";

/// Access to the singleton [`AutoTesterConfig`] record
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn Store>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn Store>) -> Result<Self, AutoTesterError> {
        store
            .create_bucket(CONFIG_BUCKET)
            .map_err(AutoTesterError::store)?;
        Ok(Self { store })
    }

    /// Load the record, `None` if it was never written
    pub fn load(&self) -> Result<Option<AutoTesterConfig>, AutoTesterError> {
        let Some(value) = self
            .store
            .get(CONFIG_BUCKET, CONFIG_RECORD_ID)
            .map_err(AutoTesterError::store)?
        else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AutoTesterError::Store {
                reason: format!("Corrupted auto-tester configuration record: {}", e),
            })
    }

    /// Load the record, writing `seed` first if the store has none
    pub fn load_or_seed(&self, seed: &AutoTesterConfig) -> Result<AutoTesterConfig, AutoTesterError> {
        if let Some(config) = self.load()? {
            debug!("Loaded auto-tester configuration from store");
            return Ok(config);
        }
        info!(
            "No auto-tester configuration stored, seeding with analyzer address 0x{:02X}",
            seed.address
        );
        self.save(seed)
    }

    /// Validate and overwrite the record; returns what was stored
    pub fn save(&self, config: &AutoTesterConfig) -> Result<AutoTesterConfig, AutoTesterError> {
        config.validate()?;
        let mut record = config.clone();
        record.id = CONFIG_RECORD_ID.to_string();
        let value = serde_json::to_value(&record).map_err(|e| AutoTesterError::Store {
            reason: format!("Failed to serialize auto-tester configuration: {}", e),
        })?;
        self.store
            .update(CONFIG_BUCKET, CONFIG_RECORD_ID, value)
            .map_err(AutoTesterError::store)?;
        Ok(record)
    }
}

/// Append-only access to [`Reading`]s
#[derive(Clone)]
pub struct ResultStore {
    store: Arc<dyn Store>,
}

impl ResultStore {
    pub fn new(store: Arc<dyn Store>) -> Result<Self, AutoTesterError> {
        store
            .create_bucket(READINGS_BUCKET)
            .map_err(AutoTesterError::store)?;
        Ok(Self { store })
    }

    /// Persist a reading and return the id the store assigned to it
    pub fn append(&self, reading: Reading) -> Result<String, AutoTesterError> {
        let mut reading = reading;
        self.store
            .create(READINGS_BUCKET, &mut |id| {
                reading.id = id.to_string();
                Ok(serde_json::to_value(&reading)?)
            })
            .map_err(AutoTesterError::store)
    }

    /// [`append`](Self::append) on the blocking pool, for callers on the async runtime
    pub async fn append_blocking(&self, reading: Reading) -> Result<String, AutoTesterError> {
        let results = self.clone();
        tokio::task::spawn_blocking(move || results.append(reading))
            .await
            .map_err(|e| AutoTesterError::store(e.into()))?
    }

    /// Fetch one reading by id
    pub fn get(&self, id: &str) -> Result<Option<Reading>, AutoTesterError> {
        let Some(value) = self
            .store
            .get(READINGS_BUCKET, id)
            .map_err(AutoTesterError::store)?
        else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| AutoTesterError::Store {
                reason: format!("Corrupted reading '{}': {}", id, e),
            })
    }

    /// Timestamp/value pairs of one parameter, in store iteration order
    pub fn list_by_parameter(&self, parameter: Parameter) -> Result<Vec<ResultPoint>, AutoTesterError> {
        let mut points = Vec::new();
        self.store
            .list(READINGS_BUCKET, &mut |id, value| {
                let reading: Reading = match serde_json::from_value(value.clone()) {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("Skipping undecodable reading '{}': {}", id, e);
                        return Ok(());
                    }
                };
                if reading.parameter == parameter {
                    points.push(ResultPoint {
                        timestamp: reading.timestamp,
                        value: reading.value,
                    });
                }
                Ok(())
            })
            .map_err(AutoTesterError::store)?;
        Ok(points)
    }
}
