//! Session lifecycle: creation, periodic recycling, health verification,
//! guaranteed teardown.
//!
//! The external session is opaque behind two traits: a backend that can
//! open sessions and the handle the open call yields. The manager owns at
//! most one live handle; a replacement is never opened before the previous
//! handle's teardown has been attempted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{FetchError, SessionError};
use crate::retry::RetryPolicy;

/// Result of one bounded fetch. Absence of pinned content is a sentinel,
/// not an error.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Content(String),
    NotFound,
}

/// One cookie from the stored credential blob. Extra fields in the blob
/// are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// A live external session. Fetches borrow the handle for the duration of
/// the call only; the manager stays the sole owner.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Fetch the current raw content for `target`. The caller enforces the
    /// per-check deadline.
    async fn fetch(&self, target: &str) -> Result<FetchOutcome, FetchError>;

    /// Lightweight synthetic request verifying the session still works.
    async fn probe(&self) -> Result<(), FetchError>;

    /// Best-effort teardown. Implementations must attempt every owned
    /// resource, most specific first, log individual failures, and never
    /// surface an error to the caller.
    async fn close(&self);
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, credentials: &[Cookie]) -> Result<Arc<dyn SessionHandle>, SessionError>;
}

/// What `ensure_ready` did this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyAction {
    Noop,
    Probed,
    ProbeRecycled,
    ForcedRecycled,
}

pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    handle: Option<Arc<dyn SessionHandle>>,
    credentials_path: PathBuf,
    restart_period: u64,
    health_check_period: u64,
    settle: std::time::Duration,
    retry: RetryPolicy,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, cfg: &Config) -> Self {
        Self {
            backend,
            handle: None,
            credentials_path: cfg.credentials_path.clone(),
            restart_period: cfg.restart_period,
            health_check_period: cfg.health_check_period,
            settle: cfg.restart_settle(),
            retry: RetryPolicy::new(cfg.init_retry_attempts, cfg.init_retry_delay()),
        }
    }

    /// Build the session: load the credential blob and open the backend,
    /// retrying transient failures only. Retry exhaustion escalates to a
    /// fatal init error.
    pub async fn initialize(&mut self) -> Result<(), SessionError> {
        if self.handle.is_some() {
            self.close().await;
        }

        let credentials = self.load_credentials()?;
        tracing::info!(cookies = credentials.len(), "initializing session");

        let backend = Arc::clone(&self.backend);
        let handle = self
            .retry
            .attempt(
                "session init",
                || {
                    let backend = Arc::clone(&backend);
                    let credentials = credentials.clone();
                    async move { backend.open(&credentials).await }
                },
                SessionError::is_transient,
            )
            .await
            .map_err(SessionError::into_fatal)?;

        self.handle = Some(handle);
        tracing::info!("session ready");
        Ok(())
    }

    /// Deterministic per-cycle recycling policy: a forced recycle every
    /// `restart_period` cycles takes precedence and skips the probe; a
    /// health probe runs every `health_check_period` cycles and recycles
    /// on failure; otherwise no-op.
    pub async fn ensure_ready(&mut self, cycle: u64) -> Result<ReadyAction, SessionError> {
        if cycle % self.restart_period == 0 {
            tracing::info!(cycle, "restart period reached, recycling session");
            self.recycle().await?;
            return Ok(ReadyAction::ForcedRecycled);
        }

        if cycle % self.health_check_period == 0 {
            tracing::debug!(cycle, "running session health probe");
            let probe = match &self.handle {
                Some(h) => h.probe().await,
                None => Err(FetchError::Other(anyhow!("no live session"))),
            };
            if let Err(e) = probe {
                tracing::warn!(cycle, error = %e, "health probe failed, recycling session");
                self.recycle().await?;
                return Ok(ReadyAction::ProbeRecycled);
            }
            return Ok(ReadyAction::Probed);
        }

        Ok(ReadyAction::Noop)
    }

    /// The current handle, shared for the duration of one cycle's fan-out.
    pub fn handle(&self) -> Result<Arc<dyn SessionHandle>, SessionError> {
        self.handle
            .clone()
            .ok_or_else(|| SessionError::Init(anyhow!("session not initialized")))
    }

    /// Best-effort teardown of the live handle. Never fails.
    pub async fn close(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close().await;
            tracing::info!("session released");
        }
    }

    async fn recycle(&mut self) -> Result<(), SessionError> {
        self.close().await;
        // let the OS reclaim process-level resources before reopening
        tokio::time::sleep(self.settle).await;
        self.initialize().await
    }

    fn load_credentials(&self) -> Result<Vec<Cookie>, SessionError> {
        let raw = std::fs::read_to_string(&self.credentials_path)
            .with_context(|| {
                format!(
                    "credential store missing or unreadable: {}",
                    self.credentials_path.display()
                )
            })
            .map_err(SessionError::Init)?;
        serde_json::from_str(&raw)
            .context("credential store is not a JSON cookie list")
            .map_err(SessionError::Init)
    }
}

/// Bundled HTTP collaborator: a cookie-bearing `reqwest` client standing
/// in for the heavier browser session the fetch routine may require.
pub struct HttpSessionBackend {
    base_url: String,
    probe_url: String,
}

impl HttpSessionBackend {
    pub fn new(cfg: &Config) -> Self {
        Self {
            base_url: cfg.target_base_url.trim_end_matches('/').to_string(),
            probe_url: cfg.probe_url.clone(),
        }
    }
}

#[async_trait]
impl SessionBackend for HttpSessionBackend {
    async fn open(&self, credentials: &[Cookie]) -> Result<Arc<dyn SessionHandle>, SessionError> {
        let cookie_line = credentials
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");

        let mut headers = HeaderMap::new();
        if !cookie_line.is_empty() {
            let value = HeaderValue::from_str(&cookie_line)
                .context("credential blob contains non-header-safe bytes")
                .map_err(SessionError::Init)?;
            headers.insert(COOKIE, value);
        }
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) pinwatch/0.1"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("build http client")
            .map_err(SessionError::Transient)?;

        Ok(Arc::new(HttpSession {
            client,
            base_url: self.base_url.clone(),
            probe_url: self.probe_url.clone(),
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    probe_url: String,
}

#[async_trait]
impl SessionHandle for HttpSession {
    async fn fetch(&self, target: &str) -> Result<FetchOutcome, FetchError> {
        let url = format!("{}/{}", self.base_url, target);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Other(anyhow!(e).context(format!("GET {url}"))))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        let resp = resp
            .error_for_status()
            .map_err(|e| FetchError::Other(anyhow!(e).context(format!("GET {url} non-2xx"))))?;
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Other(anyhow!(e).context("read body")))?;
        Ok(FetchOutcome::Content(body))
    }

    async fn probe(&self) -> Result<(), FetchError> {
        self.client
            .get(&self.probe_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Other(anyhow!(e).context("health probe")))?;
        Ok(())
    }

    async fn close(&self) {
        // the client owns no process-level resources; dropping is enough
        tracing::debug!("http session dropped");
    }
}
