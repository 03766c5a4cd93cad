// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::Result;
use rust_autotester::autotester::ParameterSchedule;
use rust_autotester::config::{BusType, Config, StorageType};
use tempfile::tempdir;

#[test]
fn test_config_load_and_save() -> Result<()> {
    // Create a temporary directory
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");

    // Create a custom config
    let mut config = Config::default();
    config.autotester.poll_interval_ms = 250;
    config.autotester.initial.address = 0x22;
    config.autotester.initial.alk = ParameterSchedule::enabled("0 0 */6 * * *");
    config.bus.bus_type = BusType::Mock;
    config.bus.mock.busy_polls = 7;
    config.storage.storage_type = StorageType::Memory;

    // Save config to file
    config.save_to_file(&config_path)?;

    // Load config from file
    let loaded_config = Config::from_file(&config_path)?;

    // Verify loaded config matches original
    assert_eq!(loaded_config.autotester.poll_interval_ms, 250);
    assert_eq!(loaded_config.autotester.initial, config.autotester.initial);
    assert_eq!(loaded_config.bus.bus_type, BusType::Mock);
    assert_eq!(loaded_config.bus.mock.busy_polls, 7);
    assert_eq!(loaded_config.storage.storage_type, StorageType::Memory);

    // Test loading default config for non-existent file
    let non_existent_path = temp_dir.path().join("non_existent.yaml");
    let default_config = Config::from_file(&non_existent_path)?;

    // Verify default config was created
    assert!(non_existent_path.exists());
    assert_eq!(default_config.bus.bus_type, BusType::Native);
    assert_eq!(default_config.bus.device, "/dev/i2c-1");
    assert_eq!(default_config.autotester.initial.address, 0x10);

    Ok(())
}

#[test]
fn test_apply_args() {
    let mut config = Config::default();

    // Nothing provided, nothing changes
    config.apply_args(None, None, false, None);
    assert_eq!(config.bus.device, "/dev/i2c-1");
    assert_eq!(config.bus.bus_type, BusType::Native);

    config.apply_args(
        Some("/dev/i2c-3".to_string()),
        Some(0x30),
        true,
        Some("/var/lib/autotester".to_string()),
    );
    assert_eq!(config.bus.device, "/dev/i2c-3");
    assert_eq!(config.bus.bus_type, BusType::Mock);
    assert_eq!(config.autotester.initial.address, 0x30);
    assert_eq!(config.storage.path, "/var/lib/autotester");
}

#[test]
fn test_minimal_yaml_uses_defaults() -> Result<()> {
    let temp_dir = tempdir()?;
    let config_path = temp_dir.path().join("config.yaml");
    std::fs::write(
        &config_path,
        r#"
autotester:
  enabled: false
  initial:
    i2c_addr: 17
    ca:
      enable: true
      rule: "@daily"
bus:
  type: mock
  device: ""
"#,
    )?;

    let config = Config::from_file(&config_path)?;
    assert!(!config.autotester.enabled);
    assert_eq!(config.autotester.poll_interval_ms, 500);
    assert_eq!(config.autotester.initial.address, 17);
    assert!(config.autotester.initial.ca.enable);
    assert!(!config.autotester.initial.mg.enable);
    assert_eq!(config.storage.storage_type, StorageType::File);

    Ok(())
}
