//! Outbound notifications: events, channel trait, fan-out mux, and the
//! detached-dispatch tracker.
//!
//! Every path through here is best-effort telemetry. A failed send is
//! logged and dropped; nothing in this module may stall or abort the
//! polling cadence.

pub mod chat;
pub mod email;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;

use crate::metrics::MetricsSummary;

/// Everything the monitor can tell the outside world.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// The watched pinned content changed for one target.
    PinnedChanged {
        target: String,
        old_text: String,
        new_text: String,
        media_refs: Vec<String>,
        ts: DateTime<Utc>,
    },
    /// Continuous-failure streak crossed its threshold.
    BurstFailure {
        streak: u64,
        threshold: u64,
        cycle: u64,
        ts: DateTime<Utc>,
    },
    /// Windowed success rate stayed below threshold long enough.
    DegradedRate {
        rate: f64,
        threshold: f64,
        sustained_cycles: u64,
        cycle: u64,
        ts: DateTime<Utc>,
    },
    /// Periodic status summary, sent regardless of health.
    Report {
        summary: MetricsSummary,
        cycle: u64,
        ts: DateTime<Utc>,
    },
}

impl NotificationEvent {
    pub fn subject(&self) -> String {
        match self {
            NotificationEvent::PinnedChanged { target, .. } => {
                format!("[pinwatch] pinned content updated: {target}")
            }
            NotificationEvent::BurstFailure { streak, cycle, .. } => {
                format!("[pinwatch] P1: {streak} consecutive failed cycles (cycle {cycle})")
            }
            NotificationEvent::DegradedRate { rate, cycle, .. } => {
                format!("[pinwatch] P2: success rate {:.1}% (cycle {cycle})", rate * 100.0)
            }
            NotificationEvent::Report { cycle, .. } => {
                format!("[pinwatch] status report, cycle {cycle}")
            }
        }
    }

    pub fn body(&self) -> String {
        match self {
            NotificationEvent::PinnedChanged {
                target,
                old_text,
                new_text,
                media_refs,
                ts,
            } => format!(
                "Target: {target}\nTime: {}\n\nNew:\n{new_text}\n\nPrevious:\n{}\n\nMedia: {}\n",
                ts.to_rfc3339(),
                if old_text.is_empty() { "(none)" } else { old_text.as_str() },
                if media_refs.is_empty() {
                    "(none)".to_string()
                } else {
                    media_refs.join("\n       ")
                }
            ),
            NotificationEvent::BurstFailure {
                streak,
                threshold,
                cycle,
                ts,
            } => format!(
                "Consecutive failed cycles: {streak} (threshold {threshold})\nCycle: {cycle}\nTime: {}\n\nThe polling pipeline is failing repeatedly; check the session and the targets.\n",
                ts.to_rfc3339()
            ),
            NotificationEvent::DegradedRate {
                rate,
                threshold,
                sustained_cycles,
                cycle,
                ts,
            } => format!(
                "Windowed success rate: {:.2}% (threshold {:.0}%)\nSustained for: {sustained_cycles} cycles\nCycle: {cycle}\nTime: {}\n",
                rate * 100.0,
                threshold * 100.0,
                ts.to_rfc3339()
            ),
            NotificationEvent::Report { summary, cycle, ts } => format!(
                "Cycle: {cycle}\nTime: {}\nRunning since: {}\nTotal cycles: {}\nSuccesses: {}\nFailures: {}\nContinuous failures: {}\nWindowed success rate: {:.2}%\nOverall success rate: {:.2}%\n",
                ts.to_rfc3339(),
                summary.started_at.to_rfc3339(),
                summary.total_cycles,
                summary.successes,
                summary.failures,
                summary.continuous_failures,
                summary.windowed_success_rate * 100.0,
                summary.overall_success_rate * 100.0
            ),
        }
    }

    /// Health alerts and reports go to the admin audience; content
    /// changes go to the subscriber audience.
    pub fn is_operational(&self) -> bool {
        !matches!(self, NotificationEvent::PinnedChanged { .. })
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, ev: &NotificationEvent) -> anyhow::Result<()>;
}

/// Fan-out over the configured channels; per-channel failures are logged
/// and never propagated.
#[derive(Clone, Default)]
pub struct NotifierMux {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire up whatever channels the environment configures. Missing env
    /// just means the channel is off.
    pub fn from_env() -> Self {
        let mut mux = Self::new();
        match email::EmailSender::from_env() {
            Ok(Some(sender)) => mux.push(Arc::new(sender)),
            Ok(None) => tracing::info!("email notifier disabled (no SMTP_HOST)"),
            Err(e) => tracing::warn!(error = %e, "email notifier misconfigured, disabled"),
        }
        match chat::ChatNotifier::from_env() {
            Some(chat) => mux.push(Arc::new(chat)),
            None => tracing::info!("chat notifier disabled (no CHAT_WEBHOOK_URLS)"),
        }
        mux
    }

    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub async fn notify(&self, ev: &NotificationEvent) {
        for n in &self.notifiers {
            if let Err(e) = n.send(ev).await {
                tracing::warn!(notifier = n.name(), error = %e, "notification dispatch failed");
            }
        }
    }
}

/// Fire-and-forget dispatch with tracked tasks: finished tasks are reaped
/// every cycle, and the whole set is cancelled during shutdown. Dropping
/// an in-flight notification at shutdown is acceptable.
pub struct Dispatcher {
    mux: Arc<NotifierMux>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(mux: NotifierMux) -> Self {
        Self {
            mux: Arc::new(mux),
            tasks: JoinSet::new(),
        }
    }

    pub fn dispatch(&mut self, ev: NotificationEvent) {
        if self.mux.is_empty() {
            tracing::debug!("no notifiers configured, dropping event: {}", ev.subject());
            return;
        }
        let mux = Arc::clone(&self.mux);
        self.tasks.spawn(async move {
            mux.notify(&ev).await;
        });
    }

    /// Collect already-finished dispatch tasks without blocking.
    pub fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!(error = %e, "notification task panicked");
                }
            }
        }
    }

    /// Cancel whatever is still in flight.
    pub async fn shutdown(&mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}
