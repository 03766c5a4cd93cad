// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rust auto-tester library
//!
//! This library schedules water chemistry measurements (calcium, alkalinity,
//! magnesium, nitrate, phosphate) on an analyzer attached to an I2C bus and
//! stores the readings.

pub mod autotester;
pub mod config;
pub mod daemon;
pub mod error;
pub mod storage;

pub use error::AutoTesterError;
