// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Water chemistry auto-tester
//!
//! This module drives an analyzer attached to an I2C bus:
//! - Bus drivers (native Linux and simulated analyzer)
//! - The start / poll / read-result handshake
//! - One scheduled worker per enabled parameter, supervised and reconciled
//!   after configuration changes
//! - On-demand tests and calibrations
//! - Persistence of the configuration record and of readings
//!
//! [`AutoTester`] ties everything together.

pub mod cancel;
pub mod controller;
pub mod drivers;
pub mod model;
pub mod protocol;
pub mod schedule;
pub mod store;
pub mod supervisor;
pub mod trigger;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use controller::AutoTester;
pub use drivers::{create_bus_driver, share_bus, I2CBusDriver, SharedBus};
pub use model::{
    AutoTesterConfig, CalibrationTarget, Command, DeviceStatus, Parameter, ParameterSchedule,
    Reading, ResultPoint,
};
pub use protocol::ProtocolDriver;
pub use schedule::{LoopExit, Recurrence, ScheduleManager};
pub use store::{ConfigStore, ResultStore};
pub use supervisor::Supervisor;
pub use trigger::Trigger;
