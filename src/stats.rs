// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Per-key run statistics, updated on the reply path.
//!
//! Every model and script run records exactly one entry under its run key
//! when its caller resumes: calls and accumulated duration always, errors on
//! failure, samples (the output's leading dimension) on success. DAG jobs
//! carry no run key and record nothing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub calls: u64,
    pub errors: u64,
    pub samples: u64,
    pub total_duration_us: u64,
}

#[derive(Debug, Default)]
pub struct StatsRegistry {
    inner: Mutex<HashMap<String, RunStats>>,
}

impl StatsRegistry {
    pub fn new() -> StatsRegistry {
        StatsRegistry::default()
    }

    pub fn record(&self, key: &str, duration: Duration, samples: u64, success: bool) {
        let mut inner = self.lock();
        let entry = inner.entry(key.to_string()).or_default();
        entry.calls += 1;
        entry.total_duration_us += duration.as_micros() as u64;
        if success {
            entry.samples += samples;
        } else {
            entry.errors += 1;
        }
    }

    pub fn get(&self, key: &str) -> Option<RunStats> {
        self.lock().get(key).copied()
    }

    /// Drop the entry for `key`, e.g. when its model is removed.
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let inner = self.lock();
        serde_json::to_value(&*inner).unwrap_or(serde_json::Value::Null)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RunStats>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_accumulates_calls_and_samples() {
        let stats = StatsRegistry::new();
        stats.record("m", Duration::from_micros(100), 4, true);
        stats.record("m", Duration::from_micros(50), 2, true);

        let entry = stats.get("m").unwrap();
        assert_eq!(entry.calls, 2);
        assert_eq!(entry.errors, 0);
        assert_eq!(entry.samples, 6);
        assert_eq!(entry.total_duration_us, 150);
    }

    #[test]
    fn failure_counts_an_error_and_no_samples() {
        let stats = StatsRegistry::new();
        stats.record("m", Duration::from_micros(30), 0, false);

        let entry = stats.get("m").unwrap();
        assert_eq!(entry.calls, 1);
        assert_eq!(entry.errors, 1);
        assert_eq!(entry.samples, 0);
    }

    #[test]
    fn reset_drops_the_entry() {
        let stats = StatsRegistry::new();
        stats.record("m", Duration::ZERO, 0, true);
        stats.reset("m");
        assert!(stats.get("m").is_none());
    }
}
