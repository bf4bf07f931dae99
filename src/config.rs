//! File configuration for the monitor.
//!
//! Resolution order:
//! 1) `$PINWATCH_CONFIG_PATH`
//! 2) `config/pinwatch.toml`
//! 3) built-in defaults
//!
//! Every knob has an explicit documented default and is validated once at
//! startup. Notifier credentials are not part of this file; they come from
//! the environment (see `notify`).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const ENV_PATH: &str = "PINWATCH_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/pinwatch.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Opaque identifiers of the monitored content sources.
    pub targets: Vec<String>,
    /// Base URL the bundled HTTP backend prepends to a target id.
    pub target_base_url: String,
    /// URL the health probe requests.
    pub probe_url: String,
    /// Minimum wall-clock spacing between cycle starts.
    pub check_interval_secs: u64,
    /// Per-target fetch deadline within one cycle.
    pub fetch_timeout_secs: u64,
    /// Force a full session recycle every this many cycles.
    pub restart_period: u64,
    /// Run a synthetic health probe every this many cycles.
    pub health_check_period: u64,
    /// Pause between teardown and re-init during a recycle.
    pub restart_settle_secs: u64,
    /// Total attempts for session initialization.
    pub init_retry_attempts: u32,
    /// Delay between initialization attempts.
    pub init_retry_delay_secs: u64,
    /// Durable Target -> TargetState map.
    pub history_path: PathBuf,
    /// Stored credential blob (JSON cookie list).
    pub credentials_path: PathBuf,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Continuous-failure streak that trips the burst alert (F).
    pub burst_failure_threshold: u64,
    /// Windowed success rate below which the run is degraded (R).
    pub success_rate_threshold: f64,
    /// Cycles the rate must stay below R before alerting (D).
    pub degraded_duration_cycles: u64,
    /// Rolling window used for the success rate (W).
    pub window_cycles: usize,
    /// Below this many samples the rate is optimistically 1.0.
    pub min_window_samples: usize,
    /// Status report every this many cycles (P).
    pub report_period_cycles: u64,
    /// Capacity of the in-memory cycle record buffer.
    pub history_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            target_base_url: "https://t.bilibili.com".to_string(),
            probe_url: "https://www.bilibili.com".to_string(),
            check_interval_secs: 8,
            fetch_timeout_secs: 20,
            restart_period: 10,
            health_check_period: 15,
            restart_settle_secs: 2,
            init_retry_attempts: 2,
            init_retry_delay_secs: 10,
            history_path: PathBuf::from("state/pinned_history.json"),
            credentials_path: PathBuf::from("state/cookies.json"),
            alerts: AlertConfig::default(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            burst_failure_threshold: 5,
            success_rate_threshold: 0.99,
            degraded_duration_cycles: 10,
            window_cycles: 20,
            min_window_samples: 20,
            report_period_cycles: 40,
            history_capacity: 1000,
        }
    }
}

impl Config {
    /// Load using env var + fallback path; absent file means defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        let cfg = Config::default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.check_interval_secs == 0 {
            return Err(anyhow!("check_interval_secs must be >= 1"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(anyhow!("fetch_timeout_secs must be >= 1"));
        }
        if self.restart_period == 0 || self.health_check_period == 0 {
            return Err(anyhow!("restart_period and health_check_period must be >= 1"));
        }
        if self.init_retry_attempts == 0 {
            return Err(anyhow!("init_retry_attempts must be >= 1"));
        }
        let a = &self.alerts;
        if a.burst_failure_threshold == 0 {
            return Err(anyhow!("burst_failure_threshold must be >= 1"));
        }
        if !(a.success_rate_threshold > 0.0 && a.success_rate_threshold <= 1.0) {
            return Err(anyhow!("success_rate_threshold must be in (0, 1]"));
        }
        if a.window_cycles == 0 || a.history_capacity == 0 {
            return Err(anyhow!("window_cycles and history_capacity must be >= 1"));
        }
        if a.window_cycles > a.history_capacity {
            return Err(anyhow!("window_cycles cannot exceed history_capacity"));
        }
        if a.report_period_cycles == 0 {
            return Err(anyhow!("report_period_cycles must be >= 1"));
        }
        if self.targets.is_empty() {
            tracing::warn!("target list is empty; cycles will run with nothing to check");
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_secs(self.restart_settle_secs)
    }

    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_secs(self.init_retry_delay_secs)
    }
}
