// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use anyhow::{Context, Result};
use log::{debug, error, info};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::autotester::{cancel_pair, create_bus_driver, AutoTester, CancelHandle, SharedBus};
use crate::config::Config;
use crate::storage::open_store;

/// Delay between two heartbeat log entries
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Represents a daemon task that can be started and managed
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    stop: CancelHandle,
    autotester: Option<Arc<AutoTester>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        let (stop, _) = cancel_pair();
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            stop,
            autotester: None,
        }
    }

    /// Launch all configured tasks based on configuration
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let driver = create_bus_driver(&config.bus).context("Failed to open the analyzer bus")?;
        let bus: SharedBus = Arc::new(tokio::sync::Mutex::new(driver));
        self.launch_with_bus(config, bus).await
    }

    /// Launch the daemon on an already opened bus
    pub async fn launch_with_bus(&mut self, config: &Config, bus: SharedBus) -> Result<()> {
        let store = open_store(&config.storage).context("Failed to open the store")?;
        let autotester = Arc::new(AutoTester::from_settings(&config.autotester, bus, store)?);

        if config.autotester.enabled {
            let workers = autotester.start().await?;
            info!("Auto-tester started with {} scheduled worker(s)", workers);
        } else {
            info!("Auto-tester scheduling disabled, on-demand commands only");
        }
        self.autotester = Some(autotester);

        self.start_heartbeat()?;

        Ok(())
    }

    /// The running auto-tester, once launched
    pub fn autotester(&self) -> Option<Arc<AutoTester>> {
        self.autotester.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self) -> Result<()> {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let stop = self.stop.token();
        let autotester = self.autotester.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                if let Some(autotester) = &autotester {
                    let workers = autotester.running_workers().await;
                    debug!("Daemon heartbeat: running, workers {:?}", workers);
                } else {
                    debug!("Daemon heartbeat: running");
                }
                tokio::select! {
                    _ = time::sleep(HEARTBEAT_INTERVAL) => {}
                    _ = stop.cancelled() => break,
                }
            }
            Ok(())
        });

        self.tasks.push(task);
        Ok(())
    }

    /// Stop the auto-tester and signal every task to terminate
    pub async fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        self.stop.cancel();
        if let Some(autotester) = &self.autotester {
            autotester.stop().await;
        }
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match task.await {
                Ok(Err(e)) => error!("Task failed: {:#}", e),
                Err(e) => error!("Task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        Ok(())
    }
}
