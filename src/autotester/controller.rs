// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Auto-tester facade
//!
//! [`AutoTester`] is the surface a routing layer talks to. It wires the
//! protocol driver, both stores, the supervisor and the on-demand trigger
//! around one shared bus.
//!
//! | Operation | Errors |
//! |-----------|--------|
//! | [`AutoTester::config`] | `Store` |
//! | [`AutoTester::update_config`] | `InvalidConfig`, `InvalidSchedule`, `Store` |
//! | [`AutoTester::run_test`], [`AutoTester::calibrate`] | `UnknownKey`, `Store` |
//! | [`AutoTester::device_status`] | `Bus`, `MalformedResponse`, `Store` |
//! | [`AutoTester::results`] | `UnknownKey`, `Store` |

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::info;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::drivers::SharedBus;
use super::model::{AutoTesterConfig, Command, DeviceStatus, Parameter, ResultPoint};
use super::protocol::ProtocolDriver;
use super::schedule::{Recurrence, ScheduleManager};
use super::store::{ConfigStore, ResultStore};
use super::supervisor::Supervisor;
use super::trigger::Trigger;
use crate::config::AutoTesterSettings;
use crate::error::AutoTesterError;
use crate::storage::Store;

/// Auto-tester subsystem
pub struct AutoTester {
    driver: Arc<ProtocolDriver>,
    configs: ConfigStore,
    results: ResultStore,
    supervisor: Mutex<Supervisor>,
    trigger: Trigger,
}

impl AutoTester {
    /// Build the subsystem and seed the configuration record if missing
    pub fn new(
        bus: SharedBus,
        store: Arc<dyn Store>,
        poll_interval: Duration,
        seed: &AutoTesterConfig,
    ) -> Result<Self, AutoTesterError> {
        let configs = ConfigStore::new(store.clone())?;
        let results = ResultStore::new(store)?;
        configs.load_or_seed(seed)?;

        let driver = Arc::new(ProtocolDriver::with_poll_interval(bus, poll_interval));
        let manager = ScheduleManager::new(driver.clone(), results.clone());
        Ok(Self {
            supervisor: Mutex::new(Supervisor::new(manager, configs.clone())),
            trigger: Trigger::new(driver.clone(), results.clone()),
            driver,
            configs,
            results,
        })
    }

    /// Build the subsystem from the `autotester` configuration section
    pub fn from_settings(
        settings: &AutoTesterSettings,
        bus: SharedBus,
        store: Arc<dyn Store>,
    ) -> Result<Self, AutoTesterError> {
        Self::new(
            bus,
            store,
            Duration::from_millis(settings.poll_interval_ms),
            &settings.initial,
        )
    }

    /// Start the scheduled workers; returns how many were started
    pub async fn start(&self) -> Result<usize, AutoTesterError> {
        self.supervisor.lock().await.start().await
    }

    /// Stop the scheduled workers and cancel in-flight triggered commands
    pub async fn stop(&self) {
        self.trigger.shutdown();
        self.supervisor.lock().await.stop().await;
    }

    /// Current configuration record
    pub fn config(&self) -> Result<AutoTesterConfig, AutoTesterError> {
        self.configs
            .load()?
            .ok_or_else(|| AutoTesterError::Store {
                reason: "auto-tester configuration record is missing".to_string(),
            })
    }

    /// Validate, store and apply a new configuration record
    ///
    /// Every enabled rule must parse. Running workers are reconciled with the
    /// new record.
    pub async fn update_config(
        &self,
        config: AutoTesterConfig,
    ) -> Result<AutoTesterConfig, AutoTesterError> {
        config.validate()?;
        let now = Utc::now();
        for parameter in config.enabled_parameters() {
            Recurrence::parse(&config.schedule(parameter).rule, now)?;
        }

        // Saving and reconciling under one guard keeps the workers in the stored order
        let mut supervisor = self.supervisor.lock().await;
        let stored = self.configs.save(&config)?;
        info!("Auto-tester configuration updated");
        let restarted = supervisor.reconcile(&stored).await;
        if restarted > 0 {
            info!("Auto-tester reconciled, {} worker(s) (re)started", restarted);
        }
        Ok(stored)
    }

    /// Start a test immediately; `key` is one of `ca`, `alk`, `mg`, `no3`, `po4`
    pub fn run_test(&self, key: &str) -> Result<JoinHandle<()>, AutoTesterError> {
        let command = Command::test_from_key(key)?;
        self.dispatch(command)
    }

    /// Start a calibration immediately; `key` is `pump` or a parameter key
    pub fn calibrate(&self, key: &str) -> Result<JoinHandle<()>, AutoTesterError> {
        let command = Command::calibration_from_key(key)?;
        self.dispatch(command)
    }

    /// Raw status of the analyzer
    pub async fn device_status(&self) -> Result<DeviceStatus, AutoTesterError> {
        let address = self.config()?.address;
        self.driver.query_status(address).await
    }

    /// Readings of one parameter, oldest first
    pub fn results(&self, key: &str) -> Result<Vec<ResultPoint>, AutoTesterError> {
        let parameter: Parameter = key.parse()?;
        let mut points = self.results.list_by_parameter(parameter)?;
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    /// Parameters with a live scheduled worker
    pub async fn running_workers(&self) -> Vec<Parameter> {
        self.supervisor.lock().await.running()
    }

    fn dispatch(&self, command: Command) -> Result<JoinHandle<()>, AutoTesterError> {
        let address = self.config()?.address;
        info!("Auto-tester '{}': triggered on demand", command.label());
        Ok(self.trigger.trigger(command, address))
    }
}
