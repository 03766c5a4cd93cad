// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Mock I2C driver simulating the analyzer
//!
//! This module provides a mock I2C driver that behaves like the analyzer
//! firmware:
//! - A start opcode (0x11-0x15, 0x21-0x26) begins a job
//! - Status queries (0x31) answer busy for a configurable number of polls,
//!   then idle, or the error status when the job is set to fail
//! - Result reads (0x32) deliver a little-endian f32 and end the job
//!
//! Every address that receives a write gets its own simulated analyzer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::debug;
use rand::Rng;

use super::I2CBusDriver;
use crate::autotester::model::{
    OPCODE_QUERY_STATUS, OPCODE_READ_RESULT, STATUS_ERROR, STATUS_IDLE,
};
use crate::autotester::Parameter;
use crate::config::MockBusSettings;

/// Status byte answered while a job is running
const STATUS_BUSY: u8 = 1;

/// Value returned by a successful calibration sequence
const CALIBRATION_RESULT: f32 = 1.0;

/// Counters shared between the driver and its observers
#[derive(Debug, Clone, Default)]
pub struct MockBusStats {
    started: Arc<AtomicUsize>,
    overlapping: Arc<AtomicUsize>,
    results_read: Arc<AtomicUsize>,
}

impl MockBusStats {
    /// Number of jobs started on the simulated analyzers
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of jobs started while another job was still in progress
    pub fn overlapping(&self) -> usize {
        self.overlapping.load(Ordering::SeqCst)
    }

    /// Number of result payloads delivered
    pub fn results_read(&self) -> usize {
        self.results_read.load(Ordering::SeqCst)
    }
}

/// What the next read on a simulated analyzer returns
#[derive(Debug, Clone, Copy, PartialEq)]
enum PendingRead {
    Nothing,
    Status(u8),
    Result,
}

/// Job currently executed by a simulated analyzer
#[derive(Debug, Clone)]
struct Job {
    opcode: u8,
    remaining_busy: u32,
    fails: bool,
    result: f32,
}

/// State of one simulated analyzer
#[derive(Debug)]
struct SimulatedAnalyzer {
    job: Option<Job>,
    pending_read: PendingRead,
}

impl SimulatedAnalyzer {
    fn new() -> Self {
        Self {
            job: None,
            pending_read: PendingRead::Nothing,
        }
    }
}

/// Mock I2C driver for analyzer simulation
pub struct MockI2CDriver {
    settings: MockBusSettings,
    devices: HashMap<u8, SimulatedAnalyzer>,
    stats: MockBusStats,
}

impl MockI2CDriver {
    /// Create a new mock driver from the simulation settings
    pub fn new(settings: &MockBusSettings) -> Self {
        Self {
            settings: settings.clone(),
            devices: HashMap::new(),
            stats: MockBusStats::default(),
        }
    }

    /// Counters observable after the driver has been moved into a bus
    pub fn stats(&self) -> MockBusStats {
        self.stats.clone()
    }

    fn start_job(&mut self, address: u8, opcode: u8) -> Result<()> {
        let result = match opcode {
            0x11..=0x15 => {
                let parameter = Parameter::ALL[(opcode - 0x11) as usize];
                simulated_value(self.settings.values.value(parameter), self.settings.noise)
            }
            0x21..=0x26 => CALIBRATION_RESULT,
            other => return Err(anyhow!("NACK from 0x{:02X}: unknown opcode 0x{:02X}", address, other)),
        };
        let fails = roll(self.settings.fault_rate);
        let busy_polls = self.settings.busy_polls;

        let device = self
            .devices
            .entry(address)
            .or_insert_with(SimulatedAnalyzer::new);
        if device.job.is_some() {
            self.stats.overlapping.fetch_add(1, Ordering::SeqCst);
        }
        device.job = Some(Job {
            opcode,
            remaining_busy: busy_polls,
            fails,
            result,
        });
        device.pending_read = PendingRead::Nothing;
        self.stats.started.fetch_add(1, Ordering::SeqCst);

        debug!(
            "Simulated analyzer 0x{:02X} started opcode 0x{:02X} (busy polls: {}, fails: {})",
            address, opcode, busy_polls, fails
        );
        Ok(())
    }

    fn query_status(&mut self, address: u8) {
        let device = self
            .devices
            .entry(address)
            .or_insert_with(SimulatedAnalyzer::new);
        let status = match device.job.as_mut() {
            None => STATUS_IDLE,
            Some(job) if job.remaining_busy > 0 => {
                job.remaining_busy -= 1;
                STATUS_BUSY
            }
            Some(job) if job.fails => STATUS_ERROR,
            Some(_) => STATUS_IDLE,
        };
        if status == STATUS_ERROR {
            device.job = None;
        }
        device.pending_read = PendingRead::Status(status);
    }
}

fn simulated_value(nominal: f32, noise: f32) -> f32 {
    if noise <= 0.0 {
        return nominal;
    }
    let mut rng = rand::rng();
    nominal * (1.0 + rng.random_range(-noise..=noise))
}

fn roll(probability: f64) -> bool {
    if probability <= 0.0 {
        return false;
    }
    rand::rng().random::<f64>() < probability
}

fn padded(mut bytes: Vec<u8>, count: usize) -> Vec<u8> {
    bytes.resize(count, 0xFF);
    bytes
}

#[async_trait::async_trait]
impl I2CBusDriver for MockI2CDriver {
    async fn write_bytes(&mut self, address: u8, data: &[u8]) -> Result<()> {
        let opcode = *data
            .first()
            .ok_or_else(|| anyhow!("Empty write to 0x{:02X}", address))?;
        match opcode {
            OPCODE_QUERY_STATUS => {
                self.query_status(address);
                Ok(())
            }
            OPCODE_READ_RESULT => {
                let device = self
                    .devices
                    .entry(address)
                    .or_insert_with(SimulatedAnalyzer::new);
                device.pending_read = PendingRead::Result;
                Ok(())
            }
            start => self.start_job(address, start),
        }
    }

    async fn read_bytes(&mut self, address: u8, count: usize) -> Result<Vec<u8>> {
        let device = self
            .devices
            .get_mut(&address)
            .ok_or_else(|| anyhow!("NACK from 0x{:02X}: no device", address))?;

        match device.pending_read {
            PendingRead::Nothing => Err(anyhow!(
                "Read from 0x{:02X} without a preceding command",
                address
            )),
            PendingRead::Status(status) => {
                device.pending_read = PendingRead::Nothing;
                Ok(padded(vec![status], count))
            }
            PendingRead::Result => {
                device.pending_read = PendingRead::Nothing;
                let job = device.job.take().ok_or_else(|| {
                    anyhow!("Result read from 0x{:02X} without a finished job", address)
                })?;
                debug!(
                    "Simulated analyzer 0x{:02X} delivers {} for opcode 0x{:02X}",
                    address, job.result, job.opcode
                );
                self.stats.results_read.fetch_add(1, Ordering::SeqCst);
                Ok(padded(job.result.to_le_bytes().to_vec(), count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(busy_polls: u32, fault_rate: f64) -> MockBusSettings {
        MockBusSettings {
            busy_polls,
            fault_rate,
            ..MockBusSettings::default()
        }
    }

    #[tokio::test]
    async fn test_simulated_measurement() {
        let mut driver = MockI2CDriver::new(&settings(2, 0.0));

        driver.write_bytes(0x10, &[0x12]).await.unwrap();
        for expected in [STATUS_BUSY, STATUS_BUSY, STATUS_IDLE] {
            driver.write_bytes(0x10, &[OPCODE_QUERY_STATUS]).await.unwrap();
            assert_eq!(driver.read_bytes(0x10, 1).await.unwrap(), vec![expected]);
        }
        driver.write_bytes(0x10, &[OPCODE_READ_RESULT]).await.unwrap();
        let bytes = driver.read_bytes(0x10, 4).await.unwrap();
        let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        assert_eq!(value, MockBusSettings::default().values.alk);
        assert_eq!(driver.stats().results_read(), 1);
    }

    #[tokio::test]
    async fn test_simulated_fault() {
        let mut driver = MockI2CDriver::new(&settings(0, 1.0));

        driver.write_bytes(0x10, &[0x11]).await.unwrap();
        driver.write_bytes(0x10, &[OPCODE_QUERY_STATUS]).await.unwrap();
        assert_eq!(driver.read_bytes(0x10, 1).await.unwrap(), vec![STATUS_ERROR]);

        // The failed job is gone, the analyzer is idle again
        driver.write_bytes(0x10, &[OPCODE_QUERY_STATUS]).await.unwrap();
        assert_eq!(driver.read_bytes(0x10, 1).await.unwrap(), vec![STATUS_IDLE]);
    }

    #[tokio::test]
    async fn test_overlapping_jobs_are_counted() {
        let mut driver = MockI2CDriver::new(&settings(1, 0.0));
        let stats = driver.stats();

        driver.write_bytes(0x10, &[0x11]).await.unwrap();
        driver.write_bytes(0x10, &[0x13]).await.unwrap();

        assert_eq!(stats.started(), 2);
        assert_eq!(stats.overlapping(), 1);
    }

    #[tokio::test]
    async fn test_unknown_opcode_and_orphan_read() {
        let mut driver = MockI2CDriver::new(&MockBusSettings::default());
        assert!(driver.write_bytes(0x10, &[0x00]).await.is_err());
        assert!(driver.write_bytes(0x10, &[]).await.is_err());
        assert!(driver.read_bytes(0x42, 1).await.is_err());
    }
}
