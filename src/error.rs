// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy of the auto-tester core
//!
//! Bus drivers and storage backends report failures through `anyhow`; the
//! protocol, scheduling and supervision layers classify them into
//! [`AutoTesterError`] so callers can tell a transport fault from a
//! device-reported fault.

use thiserror::Error;

/// Errors raised by the auto-tester core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutoTesterError {
    /// Transport-level I/O failure on the bus
    #[error("I2C bus failure: {reason}")]
    Bus { reason: String },

    /// The analyzer reported a fault status
    #[error("Analyzer reported a fault (status 0x{status:02X})")]
    Device { status: u8 },

    /// The analyzer answered with an unexpected number of bytes
    #[error("Malformed response from analyzer: expected {expected} byte(s), received {received}")]
    MalformedResponse { expected: usize, received: usize },

    /// A recurrence rule could not be parsed
    #[error("Invalid schedule '{rule}': {reason}")]
    InvalidSchedule { rule: String, reason: String },

    /// The persistent store failed
    #[error("Store failure: {reason}")]
    Store { reason: String },

    /// A trigger key outside the closed parameter/calibration set
    #[error("Unknown key '{key}'")]
    UnknownKey { key: String },

    /// The auto-tester configuration record is not usable
    #[error("Invalid auto-tester configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The operation was abandoned because its cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,
}

impl AutoTesterError {
    /// Wrap a bus driver failure
    pub fn bus(err: anyhow::Error) -> Self {
        AutoTesterError::Bus {
            reason: format!("{:#}", err),
        }
    }

    /// Wrap a storage backend failure
    pub fn store(err: anyhow::Error) -> Self {
        AutoTesterError::Store {
            reason: format!("{:#}", err),
        }
    }

    /// Whether the error comes from the caller rather than the system
    ///
    /// A routing layer maps client faults to a 4xx answer and everything
    /// else to a 5xx answer.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            AutoTesterError::UnknownKey { .. }
                | AutoTesterError::InvalidSchedule { .. }
                | AutoTesterError::InvalidConfig { .. }
        )
    }
}
