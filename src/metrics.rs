//! Rolling counters over completed cycles.
//!
//! Ephemeral by design: the buffer is reconstructed from zero on restart
//! and never persisted. Also mirrors the headline numbers to the
//! `metrics` facade for whatever recorder the process installs.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};

use crate::config::AlertConfig;

#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub cycle: u64,
    pub ts: DateTime<Utc>,
    pub success: bool,
    pub duration_secs: f64,
}

/// Snapshot used by the periodic report.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub total_cycles: u64,
    pub successes: u64,
    pub failures: u64,
    pub continuous_failures: u64,
    pub windowed_success_rate: f64,
    pub overall_success_rate: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CycleMetrics {
    total: u64,
    successes: u64,
    failures: u64,
    continuous_failures: u64,
    records: VecDeque<CycleRecord>,
    capacity: usize,
    window_cycles: usize,
    min_window_samples: usize,
    started_at: DateTime<Utc>,
}

impl CycleMetrics {
    pub fn new(cfg: &AlertConfig) -> Self {
        Self {
            total: 0,
            successes: 0,
            failures: 0,
            continuous_failures: 0,
            records: VecDeque::with_capacity(cfg.history_capacity.min(10_000)),
            capacity: cfg.history_capacity,
            window_cycles: cfg.window_cycles,
            min_window_samples: cfg.min_window_samples,
            started_at: Utc::now(),
        }
    }

    pub fn record_cycle(&mut self, cycle: u64, success: bool, duration: Duration) {
        self.total += 1;
        if success {
            self.successes += 1;
            self.continuous_failures = 0;
        } else {
            self.failures += 1;
            self.continuous_failures += 1;
        }

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(CycleRecord {
            cycle,
            ts: Utc::now(),
            success,
            duration_secs: duration.as_secs_f64(),
        });

        counter!("monitor_cycles_total").increment(1);
        if !success {
            counter!("monitor_cycle_failures_total").increment(1);
        }
        gauge!("monitor_windowed_success_rate").set(self.windowed_success_rate());
        gauge!("monitor_continuous_failures").set(self.continuous_failures as f64);
    }

    /// Success fraction over the last `window_cycles` records. Optimistic
    /// `1.0` while the window holds fewer than `min_window_samples`
    /// records, so a fresh start cannot trip a rate alert.
    pub fn windowed_success_rate(&self) -> f64 {
        let window: Vec<_> = self
            .records
            .iter()
            .rev()
            .take(self.window_cycles)
            .collect();
        if window.len() < self.min_window_samples {
            return 1.0;
        }
        let ok = window.iter().filter(|r| r.success).count();
        ok as f64 / window.len() as f64
    }

    pub fn continuous_failures(&self) -> u64 {
        self.continuous_failures
    }

    pub fn total_cycles(&self) -> u64 {
        self.total
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_cycles: self.total,
            successes: self.successes,
            failures: self.failures,
            continuous_failures: self.continuous_failures,
            windowed_success_rate: self.windowed_success_rate(),
            overall_success_rate: if self.total > 0 {
                self.successes as f64 / self.total as f64
            } else {
                1.0
            },
            started_at: self.started_at,
        }
    }
}
