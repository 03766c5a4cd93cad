// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Auto-tester domain types
//!
//! This module holds the closed set of tested parameters, the analyzer
//! command table, device status decoding, the persisted configuration record
//! and the reading entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AutoTesterError;

/// Opcode asking the analyzer for its status byte
pub const OPCODE_QUERY_STATUS: u8 = 0x31;
/// Opcode asking the analyzer for the 4-byte result payload
pub const OPCODE_READ_RESULT: u8 = 0x32;

/// Status byte reported when the analyzer is idle
pub const STATUS_IDLE: u8 = 0;
/// Status byte reported when the analyzer failed
pub const STATUS_ERROR: u8 = 2;

/// Size of the result payload (little-endian IEEE-754 single precision)
pub const RESULT_PAYLOAD_LEN: usize = 4;

/// Fixed id of the singleton configuration record
pub const CONFIG_RECORD_ID: &str = "autotester";

/// Water chemistry parameter measured by the analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    /// Calcium
    Ca,
    /// Alkalinity
    Alk,
    /// Magnesium
    Mg,
    /// Nitrate
    No3,
    /// Phosphate
    Po4,
}

impl Parameter {
    /// Every parameter, in opcode order
    pub const ALL: [Parameter; 5] = [
        Parameter::Ca,
        Parameter::Alk,
        Parameter::Mg,
        Parameter::No3,
        Parameter::Po4,
    ];

    /// Key used in storage, triggers and logs
    pub fn key(&self) -> &'static str {
        match self {
            Parameter::Ca => "ca",
            Parameter::Alk => "alk",
            Parameter::Mg => "mg",
            Parameter::No3 => "no3",
            Parameter::Po4 => "po4",
        }
    }

    fn index(&self) -> u8 {
        match self {
            Parameter::Ca => 0,
            Parameter::Alk => 1,
            Parameter::Mg => 2,
            Parameter::No3 => 3,
            Parameter::Po4 => 4,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Parameter {
    type Err = AutoTesterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .into_iter()
            .find(|p| p.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AutoTesterError::UnknownKey { key: s.to_string() })
    }
}

/// What a calibration sequence calibrates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTarget {
    /// Reagent pump
    Pump,
    /// Measurement channel of one parameter
    Parameter(Parameter),
}

impl fmt::Display for CalibrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationTarget::Pump => f.write_str("pump"),
            CalibrationTarget::Parameter(p) => p.fmt(f),
        }
    }
}

/// A command that starts a handshake on the analyzer
///
/// This is the only place opcodes for tests and calibrations are defined.
///
/// | Command | Opcode |
/// |---------|--------|
/// | test ca, alk, mg, no3, po4 | 0x11 – 0x15 |
/// | calibrate pump | 0x21 |
/// | calibrate ca, alk, mg, no3, po4 | 0x22 – 0x26 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run a measurement
    Test(Parameter),
    /// Run a calibration sequence
    Calibrate(CalibrationTarget),
}

impl Command {
    /// Parse a scheduled-test key (`ca`, `alk`, `mg`, `no3`, `po4`)
    pub fn test_from_key(key: &str) -> Result<Self, AutoTesterError> {
        key.parse().map(Command::Test)
    }

    /// Parse a calibration key (`pump` or a parameter key)
    pub fn calibration_from_key(key: &str) -> Result<Self, AutoTesterError> {
        if key.trim().eq_ignore_ascii_case("pump") {
            return Ok(Command::Calibrate(CalibrationTarget::Pump));
        }
        key.parse()
            .map(|p| Command::Calibrate(CalibrationTarget::Parameter(p)))
    }

    /// Opcode written to the analyzer to start this command
    pub fn opcode(&self) -> u8 {
        match self {
            Command::Test(p) => 0x11 + p.index(),
            Command::Calibrate(CalibrationTarget::Pump) => 0x21,
            Command::Calibrate(CalibrationTarget::Parameter(p)) => 0x22 + p.index(),
        }
    }

    /// Parameter whose reading this command produces, if any
    pub fn measured_parameter(&self) -> Option<Parameter> {
        match self {
            Command::Test(p) => Some(*p),
            Command::Calibrate(_) => None,
        }
    }

    /// Label used to tag log entries
    pub fn label(&self) -> String {
        match self {
            Command::Test(p) => p.key().to_string(),
            Command::Calibrate(target) => format!("calibrate:{}", target),
        }
    }
}

/// Decoded analyzer status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Ready, a pending result can be read
    Idle,
    /// The analyzer reported a fault
    Error,
    /// Still working; carries the raw byte
    Busy(u8),
}

impl DeviceStatus {
    /// Raw status byte as sent by the analyzer
    pub fn raw(&self) -> u8 {
        match self {
            DeviceStatus::Idle => STATUS_IDLE,
            DeviceStatus::Error => STATUS_ERROR,
            DeviceStatus::Busy(raw) => *raw,
        }
    }
}

impl From<u8> for DeviceStatus {
    fn from(raw: u8) -> Self {
        match raw {
            STATUS_IDLE => DeviceStatus::Idle,
            STATUS_ERROR => DeviceStatus::Error,
            other => DeviceStatus::Busy(other),
        }
    }
}

/// Schedule of one parameter inside the configuration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ParameterSchedule {
    /// Whether a scheduled worker runs for this parameter
    #[serde(default)]
    pub enable: bool,

    /// Recurrence rule (cron syntax with a seconds field)
    #[serde(default)]
    pub rule: String,
}

impl ParameterSchedule {
    /// Enabled schedule with the given rule
    pub fn enabled(rule: &str) -> Self {
        Self {
            enable: true,
            rule: rule.to_string(),
        }
    }
}

/// Singleton auto-tester configuration record
///
/// Holds the analyzer bus address and the schedule of every parameter.
/// The record is created or overwritten through the configuration API and
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTesterConfig {
    /// Record id, always [`CONFIG_RECORD_ID`]
    #[serde(default = "default_record_id")]
    pub id: String,

    /// 7-bit bus address of the analyzer
    #[serde(rename = "i2c_addr")]
    pub address: u8,

    #[serde(default)]
    pub ca: ParameterSchedule,
    #[serde(default)]
    pub alk: ParameterSchedule,
    #[serde(default)]
    pub mg: ParameterSchedule,
    #[serde(default)]
    pub no3: ParameterSchedule,
    #[serde(default)]
    pub po4: ParameterSchedule,
}

fn default_record_id() -> String {
    CONFIG_RECORD_ID.to_string()
}

impl Default for AutoTesterConfig {
    fn default() -> Self {
        Self {
            id: default_record_id(),
            address: 0x10,
            ca: ParameterSchedule::default(),
            alk: ParameterSchedule::default(),
            mg: ParameterSchedule::default(),
            no3: ParameterSchedule::default(),
            po4: ParameterSchedule::default(),
        }
    }
}

impl AutoTesterConfig {
    /// Schedule of one parameter
    pub fn schedule(&self, parameter: Parameter) -> &ParameterSchedule {
        match parameter {
            Parameter::Ca => &self.ca,
            Parameter::Alk => &self.alk,
            Parameter::Mg => &self.mg,
            Parameter::No3 => &self.no3,
            Parameter::Po4 => &self.po4,
        }
    }

    /// Mutable schedule of one parameter
    pub fn schedule_mut(&mut self, parameter: Parameter) -> &mut ParameterSchedule {
        match parameter {
            Parameter::Ca => &mut self.ca,
            Parameter::Alk => &mut self.alk,
            Parameter::Mg => &mut self.mg,
            Parameter::No3 => &mut self.no3,
            Parameter::Po4 => &mut self.po4,
        }
    }

    /// Parameters whose schedule is enabled
    pub fn enabled_parameters(&self) -> Vec<Parameter> {
        Parameter::ALL
            .into_iter()
            .filter(|p| self.schedule(*p).enable)
            .collect()
    }

    /// Check the record invariants that do not involve rule parsing
    pub fn validate(&self) -> Result<(), AutoTesterError> {
        if self.address == 0 {
            return Err(AutoTesterError::InvalidConfig {
                reason: "analyzer address must be non-zero".to_string(),
            });
        }
        if self.address > 0x7F {
            return Err(AutoTesterError::InvalidConfig {
                reason: format!("analyzer address 0x{:02X} is not a 7-bit address", self.address),
            });
        }
        Ok(())
    }
}

/// A completed measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifier assigned by the store
    #[serde(default)]
    pub id: String,
    /// Measured parameter
    pub parameter: Parameter,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    /// Value decoded from the analyzer payload
    pub value: f32,
}

impl Reading {
    /// New reading stamped with the current time; the id is set on append
    pub fn new(parameter: Parameter, value: f32) -> Self {
        Self {
            id: String::new(),
            parameter,
            timestamp: Utc::now(),
            value,
        }
    }
}

/// Timestamp/value pair returned by result queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f32,
}
