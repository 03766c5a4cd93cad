// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use chrono::Utc;
use log::debug;

use super::{BusType, Config, StorageType};
use crate::autotester::{Parameter, Recurrence};

/// Load the embedded JSON schema of the configuration file
pub fn config_schema() -> Result<serde_json::Value> {
    let schema_str = include_str!("../../resources/config.schema.json");
    serde_json::from_str(schema_str).context("Failed to parse JSON schema")
}

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line. It outputs the full JSON schema for the configuration
/// to stdout, formatted for readability.
///
/// # Example
///
/// ```bash
/// ./rust_autotester --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema = config_schema()?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Poll interval**: must be greater than zero
/// - **Analyzer address**: the initial record must hold a non-zero 7-bit address
/// - **Initial schedules**: every enabled parameter must carry a parsable recurrence rule
/// - **Bus**: a native bus needs a device path; the simulated fault rate is a probability
/// - **Storage**: the file backend needs a directory path
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    if config.autotester.poll_interval_ms == 0 {
        anyhow::bail!("autotester.poll_interval_ms must be greater than zero");
    }

    config
        .autotester
        .initial
        .validate()
        .context("Invalid autotester.initial record")?;

    let now = Utc::now();
    for parameter in Parameter::ALL {
        let schedule = config.autotester.initial.schedule(parameter);
        if schedule.enable {
            Recurrence::parse(&schedule.rule, now).with_context(|| {
                format!("Invalid initial schedule for parameter '{}'", parameter)
            })?;
        }
    }

    if config.bus.bus_type == BusType::Native && config.bus.device.trim().is_empty() {
        anyhow::bail!("A native I2C bus requires a device path");
    }

    if !(0.0..=1.0).contains(&config.bus.mock.fault_rate) {
        anyhow::bail!(
            "bus.mock.fault_rate must be between 0.0 and 1.0, got {}",
            config.bus.mock.fault_rate
        );
    }

    if config.storage.storage_type == StorageType::File && config.storage.path.trim().is_empty() {
        anyhow::bail!("The file storage backend requires a path");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotester::ParameterSchedule;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn test_embedded_schema_accepts_default_config() {
        let schema = config_schema().expect("schema parses");
        let validator = jsonschema::draft202012::options()
            .build(&schema)
            .expect("schema compiles");
        let value = serde_json::to_value(Config::default()).expect("serializable");
        assert!(validator.validate(&value).is_ok());
    }

    #[test]
    fn test_invalid_initial_rule_is_rejected() {
        let mut config = Config::default();
        config.autotester.initial.ca = ParameterSchedule::enabled("not a rule");
        assert!(validate_specific_rules(&config).is_err());

        // Disabled schedules are not checked
        config.autotester.initial.ca.enable = false;
        assert!(validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_zero_address_is_rejected() {
        let mut config = Config::default();
        config.autotester.initial.address = 0;
        assert!(validate_specific_rules(&config).is_err());
    }
}
