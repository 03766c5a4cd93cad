// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration for the analyzer bus
//!
//! This module defines which I2C driver talks to the analyzer and, for the
//! simulated driver, how the simulated analyzer behaves.

use serde::{Deserialize, Serialize};

use crate::autotester::Parameter;

/// I2C bus configuration
///
/// # Example
///
/// ```
/// use rust_autotester::config::{BusConfig, BusType};
///
/// let bus = BusConfig {
///     bus_type: BusType::Native,
///     device: "/dev/i2c-1".to_string(),
///     ..BusConfig::default()
/// };
/// assert_eq!(bus.device, "/dev/i2c-1");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus type: "native" for a Linux /dev/i2c-* bus or "mock" for the simulated analyzer
    #[serde(rename = "type")]
    pub bus_type: BusType,

    /// Device path of the native bus (e.g. "/dev/i2c-1")
    pub device: String,

    /// Simulated analyzer behaviour, only used when `type` is "mock"
    #[serde(default)]
    pub mock: MockBusSettings,
}

/// I2C bus type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusType {
    /// Linux kernel I2C bus
    Native,
    /// Simulated analyzer for development and testing
    Mock,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_type: BusType::Native,
            device: "/dev/i2c-1".to_string(),
            mock: MockBusSettings::default(),
        }
    }
}

/// Behaviour of the simulated analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockBusSettings {
    /// Number of busy status answers before a handshake completes
    #[serde(default = "default_busy_polls")]
    pub busy_polls: u32,

    /// Probability (0.0 - 1.0) that a handshake ends with a device fault
    #[serde(default)]
    pub fault_rate: f64,

    /// Relative noise applied to simulated values (0.01 = ±1%)
    #[serde(default)]
    pub noise: f32,

    /// Nominal values returned for each parameter
    #[serde(default)]
    pub values: SimulatedValues,
}

fn default_busy_polls() -> u32 {
    3
}

impl Default for MockBusSettings {
    fn default() -> Self {
        Self {
            busy_polls: default_busy_polls(),
            fault_rate: 0.0,
            noise: 0.0,
            values: SimulatedValues::default(),
        }
    }
}

/// Nominal simulated values, in the unit the analyzer reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedValues {
    /// Calcium in ppm
    pub ca: f32,
    /// Alkalinity in dKH
    pub alk: f32,
    /// Magnesium in ppm
    pub mg: f32,
    /// Nitrate in ppm
    pub no3: f32,
    /// Phosphate in ppm
    pub po4: f32,
}

impl Default for SimulatedValues {
    fn default() -> Self {
        Self {
            ca: 420.0,
            alk: 8.2,
            mg: 1350.0,
            no3: 5.0,
            po4: 0.05,
        }
    }
}

impl SimulatedValues {
    /// Nominal value of one parameter
    pub fn value(&self, parameter: Parameter) -> f32 {
        match parameter {
            Parameter::Ca => self.ca,
            Parameter::Alk => self.alk,
            Parameter::Mg => self.mg,
            Parameter::No3 => self.no3,
            Parameter::Po4 => self.po4,
        }
    }
}
