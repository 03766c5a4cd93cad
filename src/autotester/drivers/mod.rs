// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! I2C drivers for the analyzer bus
//!
//! This module provides different I2C bus driver implementations:
//! - Native: Linux kernel I2C bus through /dev/i2c-* devices
//! - Mock: Simulated analyzer for testing and development

pub mod mock;
#[cfg(target_os = "linux")]
pub mod native;

use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::Mutex;

use crate::config::{BusConfig, BusType};

pub use mock::MockI2CDriver;
#[cfg(target_os = "linux")]
pub use native::NativeI2CDriver;

/// I2C bus driver trait for hardware abstraction
///
/// The analyzer protocol only needs plain writes and reads addressed to a
/// device; there is no register addressing.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait I2CBusDriver {
    /// Write raw bytes to the device at `address`
    async fn write_bytes(&mut self, address: u8, data: &[u8]) -> Result<()>;

    /// Read exactly `count` bytes from the device at `address`
    ///
    /// Drivers return what the device delivered; callers check the length.
    async fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>>;
}

/// Bus shared by every handshake; the lock is held for a whole transaction
pub type SharedBus = Arc<Mutex<Box<dyn I2CBusDriver + Send + Sync>>>;

/// Wrap a driver into a [`SharedBus`]
pub fn share_bus<D>(driver: D) -> SharedBus
where
    D: I2CBusDriver + Send + Sync + 'static,
{
    Arc::new(Mutex::new(Box::new(driver)))
}

/// Create the bus driver selected by the configuration
pub fn create_bus_driver(config: &BusConfig) -> Result<Box<dyn I2CBusDriver + Send + Sync>> {
    match config.bus_type {
        BusType::Native => {
            info!("Opening native I2C bus {}", config.device);
            create_native_driver(&config.device)
        }
        BusType::Mock => {
            info!("Using simulated analyzer bus");
            Ok(Box::new(MockI2CDriver::new(&config.mock)))
        }
    }
}

#[cfg(target_os = "linux")]
fn create_native_driver(device: &str) -> Result<Box<dyn I2CBusDriver + Send + Sync>> {
    Ok(Box::new(NativeI2CDriver::new(device)?))
}

#[cfg(not(target_os = "linux"))]
fn create_native_driver(device: &str) -> Result<Box<dyn I2CBusDriver + Send + Sync>> {
    anyhow::bail!(
        "Native I2C bus {} is only available on Linux, use the mock bus instead",
        device
    )
}
