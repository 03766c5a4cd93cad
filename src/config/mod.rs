// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the auto-tester application
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings for the auto-tester application. The configuration
//! is backed by a YAML file and validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! The application's configuration is organized as a nested structure with sections:
//! - `autotester`: Settings for the scheduled workers and the initial schedules
//! - `bus`: Settings for the I2C bus the analyzer is attached to
//! - `storage`: Settings for the persistent store holding configuration and readings
//!
//! ## Usage
//!
//! ```no_run
//! use rust_autotester::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("/dev/i2c-0".to_string()), // I2C device
//!     Some(0x11),                     // Analyzer address
//!     false,                          // Simulate the analyzer
//!     None,                           // Storage path
//! );
//!
//! println!("Analyzer bus: {}", config.bus.device);
//! ```

pub mod autotester;
pub mod bus;
pub mod storage;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for public API
pub use autotester::AutoTesterSettings;
pub use bus::{BusConfig, BusType, MockBusSettings, SimulatedValues};
pub use storage::{StorageConfig, StorageType};
pub use utils::{output_config_schema, validate_specific_rules};

/// Root configuration structure for the auto-tester application.
///
/// # Structure
///
/// The configuration is designed to be deserialized from and serialized to YAML
/// using the serde framework. The structure is validated against a JSON schema
/// to ensure all required fields are present and have valid values.
///
/// # Default Values
///
/// Each section uses default values when not explicitly specified in the configuration
/// file, allowing for minimal configuration when custom settings are not required.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Scheduled worker settings and the initial configuration record.
    #[serde(default)]
    pub autotester: AutoTesterSettings,

    /// Analyzer bus settings.
    ///
    /// Selects the native Linux I2C bus or the simulated analyzer.
    #[serde(default)]
    pub bus: BusConfig,

    /// Persistent store settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with default values. A file that fails schema
    /// validation, deserialization or the specific rules makes this function
    /// write a `.sample.yaml` file next to it and return an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic Value
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        // Convert to JSON Value for validation
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema = utils::config_schema()?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the loaded configuration.
    ///
    /// # Parameters
    ///
    /// * `i2c_device` - Device path of the native I2C bus
    /// * `address` - Bus address of the analyzer, applied to the initial record
    /// * `simulate` - If true, forces the simulated analyzer bus
    /// * `storage_path` - Directory of the file store
    pub fn apply_args(
        &mut self,
        i2c_device: Option<String>,
        address: Option<u8>,
        simulate: bool,
        storage_path: Option<String>,
    ) {
        if let Some(device) = i2c_device {
            debug!("Overriding I2C device from command line: {}", device);
            self.bus.device = device;
        }

        if let Some(address) = address {
            debug!(
                "Overriding analyzer address from command line: 0x{:02X}",
                address
            );
            self.autotester.initial.address = address;
        }

        if simulate {
            debug!("Simulated analyzer requested from command line");
            self.bus.bus_type = BusType::Mock;
        }

        if let Some(path) = storage_path {
            debug!("Overriding storage path from command line: {}", path);
            self.storage.path = path;
        }
    }
}
