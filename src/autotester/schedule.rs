// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-autotester project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Recurring test execution
//!
//! A scheduled worker evaluates the recurrence rule of its parameter, sleeps
//! until the next occurrence, runs the test handshake and stores the reading.
//! The worker keeps going after a failed cycle and only leaves its loop when
//! cancelled or when the rule has no occurrence left.
//!
//! Rules use cron syntax with a seconds field
//! (`sec min hour day-of-month month day-of-week [year]`) or one of the
//! `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly` shorthands.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use log::{debug, error, info, warn};

use super::cancel::CancelToken;
use super::model::{Parameter, Reading};
use super::protocol::ProtocolDriver;
use super::store::ResultStore;
use crate::error::AutoTesterError;

/// Parsed recurrence rule anchored at a start time
#[derive(Debug, Clone)]
pub struct Recurrence {
    rule: String,
    schedule: Schedule,
    start: DateTime<Utc>,
}

impl Recurrence {
    /// Parse `rule`; occurrences are never earlier than `start`
    pub fn parse(rule: &str, start: DateTime<Utc>) -> Result<Self, AutoTesterError> {
        let trimmed = rule.trim();
        if trimmed.is_empty() {
            return Err(AutoTesterError::InvalidSchedule {
                rule: rule.to_string(),
                reason: "empty rule".to_string(),
            });
        }
        let schedule = Schedule::from_str(trimmed).map_err(|e| AutoTesterError::InvalidSchedule {
            rule: rule.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            rule: trimmed.to_string(),
            schedule,
            start,
        })
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    /// First occurrence strictly after both `after` and the start time
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let from = after.max(self.start);
        self.schedule.after(&from).next()
    }
}

/// Why a scheduled loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The cancellation token fired
    Cancelled,
    /// The rule has no further occurrence
    Exhausted,
}

/// Runs the scheduled loop of one parameter
#[derive(Clone)]
pub struct ScheduleManager {
    driver: Arc<ProtocolDriver>,
    results: ResultStore,
}

impl ScheduleManager {
    pub fn new(driver: Arc<ProtocolDriver>, results: ResultStore) -> Self {
        Self { driver, results }
    }

    /// Execute `rule` for `parameter` until cancelled or exhausted
    ///
    /// An unparsable rule is logged once and returned as
    /// [`AutoTesterError::InvalidSchedule`] without touching the bus.
    pub async fn run_loop(
        &self,
        parameter: Parameter,
        rule: &str,
        address: u8,
        opcode: u8,
        cancel: CancelToken,
    ) -> Result<LoopExit, AutoTesterError> {
        let recurrence = match Recurrence::parse(rule, Utc::now()) {
            Ok(recurrence) => recurrence,
            Err(e) => {
                error!("Auto-tester '{}': not scheduling, {}", parameter, e);
                return Err(e);
            }
        };
        info!(
            "Auto-tester '{}': scheduled with rule '{}' on 0x{:02X}, polling every {:?}",
            parameter,
            recurrence.rule(),
            address,
            self.driver.poll_interval()
        );
        Ok(self
            .run_recurrence(parameter, &recurrence, address, opcode, &cancel)
            .await)
    }

    async fn run_recurrence(
        &self,
        parameter: Parameter,
        recurrence: &Recurrence,
        address: u8,
        opcode: u8,
        cancel: &CancelToken,
    ) -> LoopExit {
        let mut last_fired: Option<DateTime<Utc>> = None;
        loop {
            let now = Utc::now();
            let after = last_fired.map_or(now, |fired| fired.max(now));
            let Some(next) = recurrence.next_after(after) else {
                warn!(
                    "Auto-tester '{}': rule '{}' has no further occurrence, stopping",
                    parameter,
                    recurrence.rule()
                );
                return LoopExit::Exhausted;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!("Auto-tester '{}': next test at {} (in {:?})", parameter, next, wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.cancelled() => {
                    debug!("Auto-tester '{}': worker cancelled while waiting", parameter);
                    return LoopExit::Cancelled;
                }
            }
            last_fired = Some(next);

            match self
                .driver
                .execute_test(address, opcode, parameter.key(), cancel)
                .await
            {
                Ok(value) => {
                    if let Err(e) = self
                        .results
                        .append_blocking(Reading::new(parameter, value))
                        .await
                    {
                        error!("Auto-tester '{}': failed to store reading: {}", parameter, e);
                    }
                }
                Err(AutoTesterError::Cancelled) => return LoopExit::Cancelled,
                // Already logged by the protocol driver; wait for the next occurrence
                Err(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotester::cancel::cancel_pair;
    use crate::autotester::drivers::{share_bus, MockI2CDriver};
    use crate::autotester::model::Command;
    use crate::autotester::drivers::mock::MockBusStats;
    use crate::config::MockBusSettings;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn manager() -> (ScheduleManager, ResultStore, MockBusStats) {
        let settings = MockBusSettings {
            busy_polls: 1,
            ..MockBusSettings::default()
        };
        let driver = MockI2CDriver::new(&settings);
        let stats = driver.stats();
        let results = ResultStore::new(Arc::new(MemoryStore::new())).unwrap();
        let protocol = Arc::new(ProtocolDriver::new(share_bus(driver)));
        (ScheduleManager::new(protocol, results.clone()), results, stats)
    }

    #[test]
    fn test_next_occurrence_is_after_start() {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        for rule in ["0 0 8 * * *", "*/5 * * * * *", "@daily", "0 30 * * * Mon"] {
            let recurrence = Recurrence::parse(rule, start).unwrap();
            let earlier = start - chrono::Duration::days(30);
            let next = recurrence.next_after(earlier).unwrap();
            assert!(next > start, "{} gave {}", rule, next);
        }

        let every_hour = Recurrence::parse("0 0 * * * *", start).unwrap();
        assert_eq!(
            every_hour.next_after(start),
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 13, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_invalid_rules() {
        let now = Utc::now();
        assert!(matches!(
            Recurrence::parse("", now),
            Err(AutoTesterError::InvalidSchedule { .. })
        ));
        assert!(Recurrence::parse("   ", now).is_err());
        assert!(Recurrence::parse("every day", now).is_err());
    }

    #[test]
    fn test_past_rule_is_exhausted() {
        let recurrence = Recurrence::parse("0 0 0 1 1 * 2001", Utc::now()).unwrap();
        assert_eq!(recurrence.next_after(Utc::now()), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_rule_never_touches_the_bus() {
        let (manager, _, stats) = manager();
        let opcode = Command::Test(Parameter::Ca).opcode();
        let outcome = manager
            .run_loop(Parameter::Ca, "", 0x10, opcode, CancelToken::never())
            .await;
        assert!(matches!(outcome, Err(AutoTesterError::InvalidSchedule { .. })));
        assert_eq!(stats.started(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_occurrence() {
        let (manager, results, stats) = manager();
        let (handle, token) = cancel_pair();
        let opcode = Command::Test(Parameter::Mg).opcode();

        let worker = tokio::spawn(async move {
            manager
                .run_loop(Parameter::Mg, "@yearly", 0x10, opcode, token)
                .await
        });
        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.cancel();

        assert_eq!(worker.await.unwrap(), Ok(LoopExit::Cancelled));
        assert_eq!(stats.started(), 0);
        assert!(results.list_by_parameter(Parameter::Mg).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_second_rule_stores_readings() {
        let (manager, results, stats) = manager();
        let (handle, token) = cancel_pair();
        let opcode = Command::Test(Parameter::Alk).opcode();

        let worker = tokio::spawn(async move {
            manager
                .run_loop(Parameter::Alk, "* * * * * *", 0x10, opcode, token)
                .await
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.cancel();

        assert_eq!(worker.await.unwrap(), Ok(LoopExit::Cancelled));
        let points = results.list_by_parameter(Parameter::Alk).unwrap();
        assert!(!points.is_empty());
        assert!(stats.results_read() >= points.len());
        assert!(results.list_by_parameter(Parameter::Ca).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_rule_ends_the_loop() {
        let (manager, _, stats) = manager();
        let opcode = Command::Test(Parameter::No3).opcode();
        let outcome = manager
            .run_loop(Parameter::No3, "0 0 0 1 1 * 2001", 0x10, opcode, CancelToken::never())
            .await;
        assert_eq!(outcome, Ok(LoopExit::Exhausted));
        assert_eq!(stats.started(), 0);
    }
}
