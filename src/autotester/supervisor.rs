// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Lifecycle of the scheduled workers
//!
//! The supervisor owns one [`WorkerHandle`] per running parameter. Stopping
//! fires every cancellation first and then joins every task, so once
//! [`Supervisor::stop`] returns no worker touches the bus anymore.

use std::collections::HashMap;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use super::cancel::{cancel_pair, CancelHandle};
use super::model::{AutoTesterConfig, Command, Parameter};
use super::schedule::{LoopExit, Recurrence, ScheduleManager};
use super::store::ConfigStore;
use crate::error::AutoTesterError;

/// A running scheduled worker
pub struct WorkerHandle {
    pub parameter: Parameter,
    pub rule: String,
    pub address: u8,
    cancel: CancelHandle,
    task: JoinHandle<Result<LoopExit, AutoTesterError>>,
}

impl WorkerHandle {
    /// Whether the worker loop already returned
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn matches(&self, rule: &str, address: u8) -> bool {
        self.rule == rule && self.address == address && !self.is_finished()
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    async fn join(self) {
        match self.task.await {
            Ok(Ok(exit)) => debug!("Auto-tester '{}': worker exited ({:?})", self.parameter, exit),
            Ok(Err(e)) => warn!("Auto-tester '{}': worker failed: {}", self.parameter, e),
            Err(e) => error!("Auto-tester '{}': worker task panicked: {}", self.parameter, e),
        }
    }
}

/// Starts, stops and reconciles the scheduled workers
pub struct Supervisor {
    manager: ScheduleManager,
    configs: ConfigStore,
    workers: HashMap<Parameter, WorkerHandle>,
    active: bool,
}

impl Supervisor {
    pub fn new(manager: ScheduleManager, configs: ConfigStore) -> Self {
        Self {
            manager,
            configs,
            workers: HashMap::new(),
            active: false,
        }
    }

    /// Start one worker per enabled parameter of the stored configuration
    ///
    /// Parameters whose rule does not parse are logged and skipped. Returns
    /// the number of workers started by this call.
    pub async fn start(&mut self) -> Result<usize, AutoTesterError> {
        let config = self
            .configs
            .load()?
            .ok_or_else(|| AutoTesterError::InvalidConfig {
                reason: "no auto-tester configuration stored".to_string(),
            })?;
        config.validate()?;
        self.active = true;
        let started = self.apply(&config).await;
        info!("Auto-tester supervisor started {} worker(s)", started);
        Ok(started)
    }

    /// Cancel every worker, then wait for all of them
    pub async fn stop(&mut self) {
        self.active = false;
        for worker in self.workers.values() {
            worker.cancel.cancel();
        }
        let count = self.workers.len();
        for (_, worker) in self.workers.drain() {
            worker.join().await;
        }
        info!("Auto-tester supervisor stopped {} worker(s)", count);
    }

    /// Bring the workers in line with `config`
    ///
    /// Only workers whose enablement, rule or address changed (or whose loop
    /// already exited) are restarted. Does nothing while the supervisor is
    /// stopped. Returns the number of workers started.
    pub async fn reconcile(&mut self, config: &AutoTesterConfig) -> usize {
        if !self.active {
            debug!("Auto-tester supervisor is stopped, nothing to reconcile");
            return 0;
        }
        self.apply(config).await
    }

    /// Parameters with a live worker, in opcode order
    pub fn running(&self) -> Vec<Parameter> {
        let mut running: Vec<Parameter> = self
            .workers
            .values()
            .filter(|w| !w.is_finished())
            .map(|w| w.parameter)
            .collect();
        running.sort();
        running
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    async fn apply(&mut self, config: &AutoTesterConfig) -> usize {
        let mut started = 0;
        for parameter in Parameter::ALL {
            let schedule = config.schedule(parameter);
            let desired = schedule.enable.then_some(schedule.rule.as_str());

            if let (Some(rule), Some(worker)) = (desired, self.workers.get(&parameter)) {
                if worker.matches(rule, config.address) {
                    continue;
                }
            }
            if let Some(worker) = self.workers.remove(&parameter) {
                debug!("Auto-tester '{}': stopping outdated worker", parameter);
                worker.shutdown().await;
            }
            if let Some(rule) = desired {
                if self.spawn_worker(parameter, rule, config.address) {
                    started += 1;
                }
            }
        }
        started
    }

    fn spawn_worker(&mut self, parameter: Parameter, rule: &str, address: u8) -> bool {
        if let Err(e) = Recurrence::parse(rule, Utc::now()) {
            error!("Auto-tester '{}': worker not started, {}", parameter, e);
            return false;
        }

        let (cancel, token) = cancel_pair();
        let manager = self.manager.clone();
        let owned_rule = rule.to_string();
        let opcode = Command::Test(parameter).opcode();
        let task = tokio::spawn(async move {
            manager
                .run_loop(parameter, &owned_rule, address, opcode, token)
                .await
        });

        self.workers.insert(
            parameter,
            WorkerHandle {
                parameter,
                rule: rule.to_string(),
                address,
                cancel,
                task,
            },
        );
        true
    }
}
