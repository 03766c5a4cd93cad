// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Auto-tester runtime configuration
//!
//! These settings control the auto-tester subsystem itself. The schedules in
//! `initial` only seed the configuration record the first time the store is
//! opened; afterwards the record is changed through the configuration API.

use serde::{Deserialize, Serialize};

use crate::autotester::AutoTesterConfig;

/// Configuration for the auto-tester subsystem.
///
/// # Fields
///
/// * `enabled` - Start the scheduled workers when the daemon launches
/// * `poll_interval_ms` - Delay between two status polls of a handshake (default: 500)
/// * `initial` - Configuration record written to the store when none exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTesterSettings {
    /// Flag to enable or disable the scheduled workers.
    pub enabled: bool,

    /// Status poll interval in milliseconds.
    ///
    /// The analyzer protocol expects 500 ms; shorter values are only useful
    /// with the simulated bus.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seed for the persisted configuration record.
    #[serde(default)]
    pub initial: AutoTesterConfig,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for AutoTesterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval_ms(),
            initial: AutoTesterConfig::default(),
        }
    }
}
