// tests/orchestrator_cycles.rs
//
// End-to-end cycle behavior against scripted session/notifier mocks:
// change detection across cycles, failure isolation, burst alerting,
// and the periodic session recycle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::watch;

use pinwatch::config::Config;
use pinwatch::error::{FetchError, SessionError};
use pinwatch::history::HistoryStore;
use pinwatch::notify::{NotificationEvent, Notifier, NotifierMux};
use pinwatch::orchestrator::{Orchestrator, RunState};
use pinwatch::session::{Cookie, FetchOutcome, SessionBackend, SessionHandle};

/// One fetch outcome per cycle, shared across all targets.
#[derive(Clone)]
enum Step {
    Html(String),
    NotFound,
    Fail,
}

#[derive(Default)]
struct Script {
    steps: Mutex<VecDeque<Step>>,
    opens: AtomicU32,
}

impl Script {
    fn push(&self, step: Step, times: usize) {
        let mut steps = self.steps.lock().unwrap();
        for _ in 0..times {
            steps.push_back(step.clone());
        }
    }
}

struct MockBackend {
    script: Arc<Script>,
    fail_open: bool,
}

struct MockHandle {
    script: Arc<Script>,
}

#[async_trait]
impl SessionBackend for MockBackend {
    async fn open(&self, _credentials: &[Cookie]) -> Result<Arc<dyn SessionHandle>, SessionError> {
        if self.fail_open {
            return Err(SessionError::Init(anyhow!("no credential blob")));
        }
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockHandle {
            script: Arc::clone(&self.script),
        }))
    }
}

#[async_trait]
impl SessionHandle for MockHandle {
    async fn fetch(&self, _target: &str) -> Result<FetchOutcome, FetchError> {
        let step = self
            .script
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("fetch script exhausted");
        match step {
            Step::Html(h) => Ok(FetchOutcome::Content(h)),
            Step::NotFound => Ok(FetchOutcome::NotFound),
            Step::Fail => Err(FetchError::Other(anyhow!("network down"))),
        }
    }

    async fn probe(&self) -> Result<(), FetchError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

struct RecordingNotifier(Arc<Recorder>);

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn send(&self, ev: &NotificationEvent) -> anyhow::Result<()> {
        let tag = match ev {
            NotificationEvent::PinnedChanged { old_text, new_text, .. } => {
                format!("change:{old_text}->{new_text}")
            }
            NotificationEvent::BurstFailure { streak, .. } => format!("burst:{streak}"),
            NotificationEvent::DegradedRate { .. } => "degraded".to_string(),
            NotificationEvent::Report { .. } => "report".to_string(),
        };
        self.0.events.lock().unwrap().push(tag);
        Ok(())
    }
}

struct Fixture {
    orchestrator: Orchestrator,
    script: Arc<Script>,
    recorder: Arc<Recorder>,
    history: Arc<HistoryStore>,
    _dir: tempfile::TempDir,
}

fn fixture(mut cfg: Config) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let creds = dir.path().join("cookies.json");
    std::fs::write(&creds, r#"[{"name":"SESSDATA","value":"abc"}]"#).unwrap();
    cfg.credentials_path = creds;
    cfg.history_path = dir.path().join("history.json");
    cfg.restart_settle_secs = 0;
    cfg.init_retry_delay_secs = 0;

    let script = Arc::new(Script::default());
    let recorder = Arc::new(Recorder::default());
    let history = Arc::new(HistoryStore::load(&cfg.history_path));

    let mut mux = NotifierMux::new();
    mux.push(Arc::new(RecordingNotifier(Arc::clone(&recorder))));

    let backend = Arc::new(MockBackend {
        script: Arc::clone(&script),
        fail_open: false,
    });
    let (_tx, rx) = watch::channel(false);
    let orchestrator = Orchestrator::new(cfg, backend, mux, Arc::clone(&history), rx);

    Fixture {
        orchestrator,
        script,
        recorder,
        history,
        _dir: dir,
    }
}

fn one_target_config() -> Config {
    let mut cfg = Config::default();
    cfg.targets = vec!["t1".to_string()];
    cfg.fetch_timeout_secs = 1;
    cfg
}

async fn settle() {
    // let fire-and-forget dispatch tasks run to completion
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn first_observation_is_silent_then_change_notifies() {
    let mut fx = fixture(one_target_config());
    fx.script.push(Step::Html("<p>hello</p>".into()), 1);
    fx.script.push(Step::Html("<p>hello</p>".into()), 1);
    fx.script.push(Step::Html("<p>goodbye</p>".into()), 1);

    fx.orchestrator.startup().await.unwrap();
    assert_eq!(fx.orchestrator.state(), RunState::Running);

    fx.orchestrator.run_cycle().await.unwrap();
    fx.orchestrator.run_cycle().await.unwrap();
    fx.orchestrator.run_cycle().await.unwrap();
    settle().await;

    let events = fx.recorder.events.lock().unwrap().clone();
    assert_eq!(events, vec!["change:hello->goodbye".to_string()]);

    // write-back is unconditional: latest snapshot survives on disk
    let reloaded = HistoryStore::load(fx._dir.path().join("history.json"));
    assert_eq!(reloaded.get("t1").unwrap().text, "goodbye");

    fx.orchestrator.shutdown().await;
    assert_eq!(fx.orchestrator.state(), RunState::Stopped);
}

#[tokio::test]
async fn failed_target_does_not_abort_cycle_and_feeds_metrics() {
    let mut cfg = one_target_config();
    cfg.targets = vec!["t1".to_string(), "t2".to_string()];
    let mut fx = fixture(cfg);
    // cycle 1: one target fails, the other succeeds
    fx.script.push(Step::Html("<p>a</p>".into()), 1);
    fx.script.push(Step::Fail, 1);

    fx.orchestrator.startup().await.unwrap();
    fx.orchestrator.run_cycle().await.unwrap();

    // one surviving target still wrote its state
    assert_eq!(fx.history.len(), 1);
    // the cycle as a whole is a failure
    assert_eq!(fx.orchestrator.metrics().continuous_failures(), 1);
    assert_eq!(fx.orchestrator.metrics().total_cycles(), 1);
}

#[tokio::test]
async fn burst_alert_fires_once_and_rearms() {
    let mut cfg = one_target_config();
    cfg.alerts.burst_failure_threshold = 3;
    cfg.alerts.min_window_samples = 100; // keep the rate alert quiet
    let mut fx = fixture(cfg);

    fx.script.push(Step::Fail, 5);
    fx.script.push(Step::Html("<p>back</p>".into()), 1);
    fx.script.push(Step::Fail, 3);

    fx.orchestrator.startup().await.unwrap();
    for _ in 0..9 {
        fx.orchestrator.run_cycle().await.unwrap();
    }
    settle().await;

    let events = fx.recorder.events.lock().unwrap().clone();
    let bursts: Vec<_> = events.iter().filter(|e| e.starts_with("burst:")).collect();
    // once at streak 3, re-armed by the success, once more at streak 3
    assert_eq!(bursts, vec!["burst:3", "burst:3"]);
}

#[tokio::test]
async fn session_recycles_on_restart_period() {
    let mut cfg = one_target_config();
    cfg.restart_period = 3;
    cfg.health_check_period = 100;
    let mut fx = fixture(cfg);
    fx.script.push(Step::Html("<p>x</p>".into()), 7);

    fx.orchestrator.startup().await.unwrap();
    for _ in 0..7 {
        fx.orchestrator.run_cycle().await.unwrap();
    }

    // initial open + recycles at cycles 3 and 6
    assert_eq!(fx.script.opens.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn not_found_is_not_a_failure_and_writes_nothing() {
    let mut fx = fixture(one_target_config());
    fx.script.push(Step::NotFound, 1);

    fx.orchestrator.startup().await.unwrap();
    fx.orchestrator.run_cycle().await.unwrap();

    assert!(fx.history.is_empty());
    assert_eq!(fx.orchestrator.metrics().continuous_failures(), 0);
}

#[tokio::test]
async fn fatal_startup_reaches_failed_state_with_zero_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = one_target_config();
    cfg.credentials_path = dir.path().join("missing.json");
    cfg.history_path = dir.path().join("history.json");
    cfg.init_retry_delay_secs = 0;

    let script = Arc::new(Script::default());
    let backend = Arc::new(MockBackend {
        script,
        fail_open: true,
    });
    let (_tx, rx) = watch::channel(false);
    let history = Arc::new(HistoryStore::load(&cfg.history_path));
    let mut orchestrator = Orchestrator::new(cfg, backend, NotifierMux::new(), history, rx);

    assert!(orchestrator.startup().await.is_err());
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(orchestrator.cycle(), 0);
}

#[tokio::test]
async fn run_drains_on_stop_signal() {
    let dir = tempfile::tempdir().unwrap();
    let creds = dir.path().join("cookies.json");
    std::fs::write(&creds, "[]").unwrap();

    let mut cfg = one_target_config();
    cfg.targets = vec![];
    cfg.check_interval_secs = 60;
    cfg.credentials_path = creds;
    cfg.history_path = dir.path().join("history.json");

    let script = Arc::new(Script::default());
    let backend = Arc::new(MockBackend {
        script,
        fail_open: false,
    });
    let (tx, rx) = watch::channel(false);
    let history = Arc::new(HistoryStore::load(&cfg.history_path));
    let mut orchestrator = Orchestrator::new(cfg, backend, NotifierMux::new(), history, rx);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);
    });

    // first cycle runs with no targets, then the loop parks in its
    // interval sleep until the stop signal lands
    orchestrator.run().await.unwrap();
    stopper.await.unwrap();

    assert_eq!(orchestrator.state(), RunState::Stopped);
    assert!(orchestrator.cycle() >= 1);
}
