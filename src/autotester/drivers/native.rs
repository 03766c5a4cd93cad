// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Native I2C driver for Linux hardware
//!
//! This module provides a native I2C driver that communicates with the
//! analyzer through the kernel /dev/i2c-* character devices.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use log::debug;

use super::I2CBusDriver;

/// Native I2C driver for Linux
///
/// One kernel handle is opened per slave address on first use and kept for
/// the lifetime of the driver.
pub struct NativeI2CDriver {
    device_path: PathBuf,
    handles: HashMap<u8, LinuxI2CDevice>,
}

impl NativeI2CDriver {
    /// Create a new native I2C driver
    pub fn new(device_path: &str) -> Result<Self> {
        let device_path = PathBuf::from(device_path);
        if !device_path.exists() {
            return Err(anyhow!(
                "I2C device {} does not exist",
                device_path.display()
            ));
        }
        Ok(Self {
            device_path,
            handles: HashMap::new(),
        })
    }

    fn handle(&mut self, address: u8) -> Result<&mut LinuxI2CDevice> {
        if !self.handles.contains_key(&address) {
            debug!(
                "Opening {} for slave 0x{:02X}",
                self.device_path.display(),
                address
            );
            let device = open_device(&self.device_path, address)?;
            self.handles.insert(address, device);
        }
        self.handles
            .get_mut(&address)
            .ok_or_else(|| anyhow!("No handle for slave 0x{:02X}", address))
    }
}

fn open_device(path: &Path, address: u8) -> Result<LinuxI2CDevice> {
    LinuxI2CDevice::new(path, u16::from(address)).with_context(|| {
        format!(
            "Failed to open {} for slave 0x{:02X}",
            path.display(),
            address
        )
    })
}

#[async_trait::async_trait]
impl I2CBusDriver for NativeI2CDriver {
    async fn write_bytes(&mut self, address: u8, data: &[u8]) -> Result<()> {
        self.handle(address)?
            .write(data)
            .with_context(|| format!("I2C write to 0x{:02X} failed", address))
    }

    async fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; count];
        self.handle(address)?
            .read(&mut buffer)
            .with_context(|| format!("I2C read from 0x{:02X} failed", address))?;
        Ok(buffer)
    }
}
