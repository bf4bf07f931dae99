//! Top-level driver: owns the session, fans out per-target checks each
//! cycle, folds results into metrics and alerts, persists state, and
//! keeps a drift-compensated cadence.
//!
//! Cycles are strictly sequential; within a cycle the per-target checks
//! run concurrently and are joined before anything else proceeds. A stop
//! request is observed at cycle boundaries and during the inter-cycle
//! sleep; the cycle in flight always completes.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::alert::AlertEngine;
use crate::config::Config;
use crate::detector::{ChangeDetector, CheckReport};
use crate::error::FetchError;
use crate::history::HistoryStore;
use crate::metrics::CycleMetrics;
use crate::notify::{Dispatcher, NotificationEvent, NotifierMux};
use crate::session::{SessionBackend, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

pub struct Orchestrator {
    cfg: Config,
    session: SessionManager,
    detector: Arc<ChangeDetector>,
    history: Arc<HistoryStore>,
    metrics: CycleMetrics,
    alerts: AlertEngine,
    dispatcher: Dispatcher,
    shutdown: watch::Receiver<bool>,
    state: RunState,
    cycle: u64,
}

impl Orchestrator {
    pub fn new(
        cfg: Config,
        backend: Arc<dyn SessionBackend>,
        mux: NotifierMux,
        history: Arc<HistoryStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let session = SessionManager::new(backend, &cfg);
        let detector = Arc::new(ChangeDetector::new(Arc::clone(&history), cfg.fetch_timeout()));
        let metrics = CycleMetrics::new(&cfg.alerts);
        let alerts = AlertEngine::new(cfg.alerts.clone());
        Self {
            cfg,
            session,
            detector,
            history,
            metrics,
            alerts,
            dispatcher: Dispatcher::new(mux),
            shutdown,
            state: RunState::Starting,
            cycle: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn metrics(&self) -> &CycleMetrics {
        &self.metrics
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Build the session and enter `RUNNING`. Fatal when initialization
    /// exhausts its retries; no cycles run in that case.
    pub async fn startup(&mut self) -> Result<()> {
        tracing::info!(
            targets = self.cfg.targets.len(),
            interval_secs = self.cfg.check_interval_secs,
            restart_period = self.cfg.restart_period,
            health_check_period = self.cfg.health_check_period,
            "monitor starting"
        );
        for target in &self.cfg.targets {
            tracing::info!(target, "watching");
        }

        if let Err(e) = self.session.initialize().await {
            self.state = RunState::Failed;
            tracing::error!(error = %e, "session initialization failed, aborting run");
            return Err(e.into());
        }
        self.state = RunState::Running;
        Ok(())
    }

    /// Graceful drain: cancel background dispatch, release the session.
    pub async fn shutdown(&mut self) {
        self.state = RunState::Stopping;
        tracing::info!("stopping: draining background dispatch, closing session");
        self.dispatcher.shutdown().await;
        self.session.close().await;
        self.state = RunState::Stopped;
        tracing::info!("monitor stopped");
    }

    /// Main loop. Returns `Err` only on fatal startup/recycle failure;
    /// everything else is absorbed per cycle.
    pub async fn run(&mut self) -> Result<()> {
        self.startup().await?;
        let result = self.run_loop().await;
        self.shutdown().await;
        if result.is_err() {
            self.state = RunState::Failed;
        }
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        loop {
            if *self.shutdown.borrow() {
                tracing::info!("stop requested, finishing up");
                return Ok(());
            }

            let started = Instant::now();
            if let Err(e) = self.run_cycle().await {
                // only session init/recycle failures escalate this far
                tracing::error!(error = %e, "fatal error mid-run");
                return Err(e);
            }

            let elapsed = started.elapsed();
            let interval = self.cfg.check_interval();
            let wait = interval.saturating_sub(elapsed);
            if wait.is_zero() {
                tracing::warn!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    "cycle exceeded the interval, starting next immediately"
                );
                continue;
            }
            tracing::debug!(wait_secs = wait.as_secs_f64(), "sleeping until next cycle");
            let mut shutdown = self.shutdown.clone();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// One complete cycle: recycle policy, concurrent isolated checks,
    /// metrics fold, persistence, alert evaluation.
    pub async fn run_cycle(&mut self) -> Result<()> {
        self.cycle += 1;
        let cycle = self.cycle;
        let started = Instant::now();
        tracing::info!(cycle, "cycle started");

        self.session.ensure_ready(cycle).await?;
        let session = self.session.handle()?;

        type CheckResult = (String, Result<Option<CheckReport>, FetchError>);
        let mut checks: JoinSet<CheckResult> = JoinSet::new();
        for target in self.cfg.targets.clone() {
            let detector = Arc::clone(&self.detector);
            let session = Arc::clone(&session);
            checks.spawn(async move {
                let outcome = detector.check(session.as_ref(), &target).await;
                (target, outcome)
            });
        }

        // barrier-join; one target's failure never cancels its siblings
        let mut failed_targets = 0usize;
        let mut changes: Vec<CheckReport> = Vec::new();
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((_, Ok(Some(report)))) if report.changed => changes.push(report),
                Ok((_, Ok(_))) => {}
                Ok((target, Err(e))) => {
                    failed_targets += 1;
                    tracing::warn!(target, error = %e, "target check failed");
                }
                Err(e) => {
                    failed_targets += 1;
                    tracing::error!(error = %e, "target check task panicked");
                }
            }
        }

        for report in changes {
            self.dispatcher.dispatch(NotificationEvent::PinnedChanged {
                target: report.target,
                old_text: report.previous.map(|p| p.text).unwrap_or_default(),
                new_text: report.state.text,
                media_refs: report.state.media_refs,
                ts: Utc::now(),
            });
        }

        let success = failed_targets == 0;
        let duration = started.elapsed();
        self.metrics.record_cycle(cycle, success, duration);

        if let Err(e) = self.history.save().await {
            // in-memory state stays authoritative; next cycle rewrites
            tracing::warn!(error = %e, "history persist failed");
        }

        for ev in self.alerts.evaluate(cycle, &self.metrics, Utc::now()) {
            self.dispatcher.dispatch(ev);
        }
        self.dispatcher.reap();

        tracing::info!(
            cycle,
            success,
            failed_targets,
            duration_secs = duration.as_secs_f64(),
            rate = self.metrics.windowed_success_rate(),
            "cycle finished"
        );
        Ok(())
    }
}
