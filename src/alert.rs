//! Hysteresis alerting over cycle metrics.
//!
//! Two independent edge-triggered state machines plus a counter-based
//! report scheduler, evaluated once per completed cycle. Evaluation is
//! pure: it returns the events to dispatch and never touches I/O, so the
//! orchestrator stays in charge of fire-and-forget delivery.

use chrono::{DateTime, Utc};

use crate::config::AlertConfig;
use crate::metrics::CycleMetrics;
use crate::notify::NotificationEvent;

/// Hysteresis bookkeeping for one alert kind. While `active`, no duplicate
/// dispatch is issued; only recovery past the threshold re-arms it.
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    pub active: bool,
    pub activated_at_cycle: Option<u64>,
    pub last_dispatch_ts: Option<DateTime<Utc>>,
}

impl AlertState {
    fn activate(&mut self, cycle: u64, now: DateTime<Utc>) {
        self.active = true;
        self.activated_at_cycle = Some(cycle);
        self.last_dispatch_ts = Some(now);
    }

    fn clear(&mut self) {
        self.active = false;
        self.activated_at_cycle = None;
    }
}

pub struct AlertEngine {
    cfg: AlertConfig,
    burst: AlertState,
    degraded: AlertState,
    /// Cycle at which the windowed rate first dropped below threshold.
    low_rate_since: Option<u64>,
    last_report_cycle: u64,
}

impl AlertEngine {
    pub fn new(cfg: AlertConfig) -> Self {
        Self {
            cfg,
            burst: AlertState::default(),
            degraded: AlertState::default(),
            low_rate_since: None,
            last_report_cycle: 0,
        }
    }

    pub fn burst_state(&self) -> &AlertState {
        &self.burst
    }

    pub fn degraded_state(&self) -> &AlertState {
        &self.degraded
    }

    /// Evaluate all alert conditions for the cycle that just completed and
    /// return the notifications to dispatch.
    pub fn evaluate(
        &mut self,
        cycle: u64,
        metrics: &CycleMetrics,
        now: DateTime<Utc>,
    ) -> Vec<NotificationEvent> {
        let mut events = Vec::new();

        // burst failure: edge-triggered on the streak crossing F,
        // re-armed once the streak drops below F again
        let streak = metrics.continuous_failures();
        if streak >= self.cfg.burst_failure_threshold {
            if !self.burst.active {
                tracing::error!(streak, cycle, "burst-failure alert raised");
                self.burst.activate(cycle, now);
                events.push(NotificationEvent::BurstFailure {
                    streak,
                    threshold: self.cfg.burst_failure_threshold,
                    cycle,
                    ts: now,
                });
            }
        } else if self.burst.active {
            tracing::info!(cycle, "burst-failure alert cleared");
            self.burst.clear();
        }

        // degraded rate: must stay below R for D consecutive cycles;
        // any recovery clears the marker and re-arms
        let rate = metrics.windowed_success_rate();
        if rate < self.cfg.success_rate_threshold {
            let since = *self.low_rate_since.get_or_insert(cycle);
            let sustained = cycle - since;
            if sustained >= self.cfg.degraded_duration_cycles && !self.degraded.active {
                tracing::error!(rate, sustained, cycle, "degraded-success-rate alert raised");
                self.degraded.activate(cycle, now);
                events.push(NotificationEvent::DegradedRate {
                    rate,
                    threshold: self.cfg.success_rate_threshold,
                    sustained_cycles: sustained,
                    cycle,
                    ts: now,
                });
            }
        } else {
            if self.low_rate_since.take().is_some() {
                tracing::info!(rate, cycle, "success rate recovered");
            }
            if self.degraded.active {
                self.degraded.clear();
            }
        }

        // periodic report, independent of health
        if cycle - self.last_report_cycle >= self.cfg.report_period_cycles {
            self.last_report_cycle = cycle;
            events.push(NotificationEvent::Report {
                summary: metrics.summary(),
                cycle,
                ts: now,
            });
        }

        events
    }
}
