// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! On-demand tests and calibrations

use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};
use tokio::task::JoinHandle;

use super::cancel::{cancel_pair, CancelHandle, CancelToken};
use super::model::{Command, Reading};
use super::protocol::ProtocolDriver;
use super::store::ResultStore;

/// Fire-and-forget execution of a [`Command`]
///
/// Test results are stored like scheduled ones; calibration outcomes are
/// only logged. Every triggered task observes a shared shutdown token.
pub struct Trigger {
    driver: Arc<ProtocolDriver>,
    results: ResultStore,
    shutdown: Mutex<CancelHandle>,
}

impl Trigger {
    pub fn new(driver: Arc<ProtocolDriver>, results: ResultStore) -> Self {
        let (handle, _) = cancel_pair();
        Self {
            driver,
            results,
            shutdown: Mutex::new(handle),
        }
    }

    /// Spawn the handshake for `command` on the analyzer at `address`
    pub fn trigger(&self, command: Command, address: u8) -> JoinHandle<()> {
        let token = self.token();
        let driver = self.driver.clone();
        let results = self.results.clone();

        tokio::spawn(async move {
            let label = command.label();
            let Ok(value) = driver
                .execute_test(address, command.opcode(), &label, &token)
                .await
            else {
                // Failures are logged by the protocol driver
                return;
            };
            match command.measured_parameter() {
                Some(parameter) => {
                    if let Err(e) = results.append_blocking(Reading::new(parameter, value)).await {
                        error!("Auto-tester '{}': failed to store reading: {}", label, e);
                    }
                }
                None => info!("Auto-tester '{}': calibration completed ({})", label, value),
            }
        })
    }

    /// Cancel every in-flight triggered handshake
    ///
    /// Commands triggered afterwards run normally.
    pub fn shutdown(&self) {
        let (fresh, _) = cancel_pair();
        let mut handle = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *handle, fresh).cancel();
    }

    fn token(&self) -> CancelToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotester::drivers::{share_bus, MockI2CDriver};
    use crate::autotester::model::{CalibrationTarget, Parameter};
    use crate::config::MockBusSettings;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    fn trigger(busy_polls: u32) -> (Trigger, ResultStore) {
        let settings = MockBusSettings {
            busy_polls,
            ..MockBusSettings::default()
        };
        let bus = share_bus(MockI2CDriver::new(&settings));
        let results = ResultStore::new(Arc::new(MemoryStore::new())).unwrap();
        (
            Trigger::new(Arc::new(ProtocolDriver::new(bus)), results.clone()),
            results,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggered_test_is_stored() {
        let (trigger, results) = trigger(2);
        trigger
            .trigger(Command::Test(Parameter::Po4), 0x10)
            .await
            .unwrap();

        let points = results.list_by_parameter(Parameter::Po4).unwrap();
        assert_eq!(points.len(), 1);
        approx::assert_relative_eq!(points[0].value, MockBusSettings::default().values.po4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_is_not_stored() {
        let (trigger, results) = trigger(0);
        trigger
            .trigger(Command::Calibrate(CalibrationTarget::Parameter(Parameter::Ca)), 0x10)
            .await
            .unwrap();
        assert!(results.list_by_parameter(Parameter::Ca).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_commands() {
        let (trigger, results) = trigger(1_000);
        let task = trigger.trigger(Command::Test(Parameter::Mg), 0x10);
        tokio::time::sleep(Duration::from_secs(2)).await;

        trigger.shutdown();
        task.await.unwrap();
        assert!(results.list_by_parameter(Parameter::Mg).unwrap().is_empty());

        // The trigger stays usable after a shutdown
        trigger
            .trigger(Command::Test(Parameter::Mg), 0x10)
            .await
            .unwrap();
        assert_eq!(results.list_by_parameter(Parameter::Mg).unwrap().len(), 1);
    }
}
