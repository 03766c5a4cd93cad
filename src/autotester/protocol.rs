// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Analyzer wire protocol
//!
//! One handshake is a small state machine:
//!
//! 1. **Start**: write the command opcode
//! 2. **Polling**: every poll interval, write `0x31` and read one status byte
//!    (`0` idle, `2` fault, anything else busy)
//! 3. **ReadResult**: write `0x32` and read 4 bytes holding a little-endian
//!    IEEE-754 `f32`
//!
//! The bus lock is held from the start opcode to the last result byte, so
//! handshakes of concurrent workers never interleave on the wire. Polling has
//! no upper bound; a stalled analyzer keeps the handshake waiting until the
//! caller cancels it.

use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::MutexGuard;

use super::cancel::CancelToken;
use super::drivers::{I2CBusDriver, SharedBus};
use super::model::{
    DeviceStatus, OPCODE_QUERY_STATUS, OPCODE_READ_RESULT, RESULT_PAYLOAD_LEN,
};
use crate::error::AutoTesterError;

/// Default delay between two status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

type BusGuard<'a> = MutexGuard<'a, Box<dyn I2CBusDriver + Send + Sync>>;

/// Executes handshakes against the analyzer
pub struct ProtocolDriver {
    bus: SharedBus,
    poll_interval: Duration,
}

impl ProtocolDriver {
    /// Create a driver polling at [`DEFAULT_POLL_INTERVAL`]
    pub fn new(bus: SharedBus) -> Self {
        Self::with_poll_interval(bus, DEFAULT_POLL_INTERVAL)
    }

    /// Create a driver with a custom poll interval
    pub fn with_poll_interval(bus: SharedBus, poll_interval: Duration) -> Self {
        Self { bus, poll_interval }
    }

    /// Delay between two status polls
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run one test or calibration handshake and return the decoded value
    ///
    /// `label` tags the log entries (usually the parameter key). The
    /// handshake is abandoned with [`AutoTesterError::Cancelled`] if `cancel`
    /// fires while waiting for the bus or between two polls.
    pub async fn execute_test(
        &self,
        address: u8,
        opcode: u8,
        label: &str,
        cancel: &CancelToken,
    ) -> Result<f32, AutoTesterError> {
        let outcome = self.handshake(address, opcode, cancel).await;
        match &outcome {
            Ok(value) => info!(
                "Auto-tester '{}': opcode 0x{:02X} on 0x{:02X} returned {}",
                label, opcode, address, value
            ),
            Err(AutoTesterError::Cancelled) => info!(
                "Auto-tester '{}': opcode 0x{:02X} on 0x{:02X} cancelled",
                label, opcode, address
            ),
            Err(e) => error!(
                "Auto-tester '{}': opcode 0x{:02X} on 0x{:02X} failed: {}",
                label, opcode, address, e
            ),
        }
        outcome
    }

    /// Read the current analyzer status byte
    pub async fn query_status(&self, address: u8) -> Result<DeviceStatus, AutoTesterError> {
        let mut bus = self.bus.lock().await;
        read_status(&mut bus, address).await
    }

    async fn handshake(
        &self,
        address: u8,
        opcode: u8,
        cancel: &CancelToken,
    ) -> Result<f32, AutoTesterError> {
        let mut bus = tokio::select! {
            guard = self.bus.lock() => guard,
            _ = cancel.cancelled() => return Err(AutoTesterError::Cancelled),
        };

        // Start
        bus.write_bytes(address, &[opcode])
            .await
            .map_err(AutoTesterError::bus)?;

        // Polling
        let mut polls = 0u64;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => return Err(AutoTesterError::Cancelled),
            }
            polls += 1;
            match read_status(&mut bus, address).await? {
                DeviceStatus::Idle => break,
                DeviceStatus::Error => {
                    return Err(AutoTesterError::Device {
                        status: DeviceStatus::Error.raw(),
                    })
                }
                DeviceStatus::Busy(raw) => {
                    debug!(
                        "Analyzer 0x{:02X} busy (status 0x{:02X}, poll #{})",
                        address, raw, polls
                    );
                }
            }
        }

        // ReadResult
        bus.write_bytes(address, &[OPCODE_READ_RESULT])
            .await
            .map_err(AutoTesterError::bus)?;
        let payload = bus
            .read_bytes(address, RESULT_PAYLOAD_LEN)
            .await
            .map_err(AutoTesterError::bus)?;
        let bytes: [u8; RESULT_PAYLOAD_LEN] =
            payload
                .as_slice()
                .try_into()
                .map_err(|_| AutoTesterError::MalformedResponse {
                    expected: RESULT_PAYLOAD_LEN,
                    received: payload.len(),
                })?;
        Ok(f32::from_le_bytes(bytes))
    }
}

async fn read_status(bus: &mut BusGuard<'_>, address: u8) -> Result<DeviceStatus, AutoTesterError> {
    bus.write_bytes(address, &[OPCODE_QUERY_STATUS])
        .await
        .map_err(AutoTesterError::bus)?;
    let status = bus
        .read_bytes(address, 1)
        .await
        .map_err(AutoTesterError::bus)?;
    match status.as_slice() {
        [raw] => Ok(DeviceStatus::from(*raw)),
        other => Err(AutoTesterError::MalformedResponse {
            expected: 1,
            received: other.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotester::cancel::cancel_pair;
    use crate::autotester::drivers::{share_bus, MockI2CBusDriver};
    use anyhow::anyhow;
    use mockall::predicate::eq;
    use mockall::Sequence;

    const ADDRESS: u8 = 0x10;

    fn expect_write(mock: &mut MockI2CBusDriver, seq: &mut Sequence, byte: u8) {
        mock.expect_write_bytes()
            .withf(move |address, data| *address == ADDRESS && data.len() == 1 && data[0] == byte)
            .times(1)
            .in_sequence(seq)
            .returning(|_, _| Ok(()));
    }

    fn expect_read(mock: &mut MockI2CBusDriver, seq: &mut Sequence, count: usize, bytes: Vec<u8>) {
        mock.expect_read_bytes()
            .with(eq(ADDRESS), eq(count))
            .times(1)
            .in_sequence(seq)
            .returning(move |_, _| Ok(bytes.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_busy_idle_then_result() {
        let mut mock = MockI2CBusDriver::new();
        let mut seq = Sequence::new();

        expect_write(&mut mock, &mut seq, 0x11);
        for status in [1u8, 1, 0] {
            expect_write(&mut mock, &mut seq, OPCODE_QUERY_STATUS);
            expect_read(&mut mock, &mut seq, 1, vec![status]);
        }
        expect_write(&mut mock, &mut seq, OPCODE_READ_RESULT);
        expect_read(&mut mock, &mut seq, 4, vec![0x00, 0x00, 0x80, 0x3F]);

        let driver = ProtocolDriver::new(share_bus(mock));
        let value = driver
            .execute_test(ADDRESS, 0x11, "ca", &CancelToken::never())
            .await;
        assert_eq!(value, Ok(1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_are_spaced_by_poll_interval() {
        let mut mock = MockI2CBusDriver::new();
        let mut seq = Sequence::new();
        expect_write(&mut mock, &mut seq, 0x13);
        for status in [1u8, 0] {
            expect_write(&mut mock, &mut seq, OPCODE_QUERY_STATUS);
            expect_read(&mut mock, &mut seq, 1, vec![status]);
        }
        expect_write(&mut mock, &mut seq, OPCODE_READ_RESULT);
        expect_read(&mut mock, &mut seq, 4, vec![0x00, 0x00, 0x00, 0x40]);

        let driver = ProtocolDriver::with_poll_interval(share_bus(mock), Duration::from_secs(2));
        assert_eq!(driver.poll_interval(), Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        let value = driver
            .execute_test(ADDRESS, 0x13, "mg", &CancelToken::never())
            .await;
        assert_eq!(value, Ok(2.0));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(4), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_error_stops_before_read_result() {
        let mut mock = MockI2CBusDriver::new();
        let mut seq = Sequence::new();

        expect_write(&mut mock, &mut seq, 0x12);
        expect_write(&mut mock, &mut seq, OPCODE_QUERY_STATUS);
        expect_read(&mut mock, &mut seq, 1, vec![2]);
        // Any further write (e.g. 0x32) would be an unexpected call and panic

        let driver = ProtocolDriver::new(share_bus(mock));
        let value = driver
            .execute_test(ADDRESS, 0x12, "alk", &CancelToken::never())
            .await;
        assert_eq!(value, Err(AutoTesterError::Device { status: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_result_is_malformed() {
        let mut mock = MockI2CBusDriver::new();
        let mut seq = Sequence::new();

        expect_write(&mut mock, &mut seq, 0x13);
        expect_write(&mut mock, &mut seq, OPCODE_QUERY_STATUS);
        expect_read(&mut mock, &mut seq, 1, vec![0]);
        expect_write(&mut mock, &mut seq, OPCODE_READ_RESULT);
        expect_read(&mut mock, &mut seq, 4, vec![0x00, 0x00, 0x80]);

        let driver = ProtocolDriver::new(share_bus(mock));
        let value = driver
            .execute_test(ADDRESS, 0x13, "mg", &CancelToken::never())
            .await;
        assert_eq!(
            value,
            Err(AutoTesterError::MalformedResponse {
                expected: 4,
                received: 3
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_failure_on_start() {
        let mut mock = MockI2CBusDriver::new();
        mock.expect_write_bytes()
            .times(1)
            .returning(|_, _| Err(anyhow!("NACK")));

        let driver = ProtocolDriver::new(share_bus(mock));
        let value = driver
            .execute_test(ADDRESS, 0x14, "no3", &CancelToken::never())
            .await;
        assert!(matches!(value, Err(AutoTesterError::Bus { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_polling() {
        let mut mock = MockI2CBusDriver::new();
        // The analyzer never leaves the busy state
        mock.expect_write_bytes().returning(|_, _| Ok(()));
        mock.expect_read_bytes().returning(|_, _| Ok(vec![1]));

        let driver = ProtocolDriver::new(share_bus(mock));
        let (handle, token) = cancel_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            handle.cancel();
        });

        let value = driver.execute_test(ADDRESS, 0x15, "po4", &token).await;
        assert_eq!(value, Err(AutoTesterError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_status() {
        let mut mock = MockI2CBusDriver::new();
        let mut seq = Sequence::new();
        expect_write(&mut mock, &mut seq, OPCODE_QUERY_STATUS);
        expect_read(&mut mock, &mut seq, 1, vec![7]);

        let driver = ProtocolDriver::new(share_bus(mock));
        assert_eq!(driver.query_status(ADDRESS).await, Ok(DeviceStatus::Busy(7)));
    }
}
