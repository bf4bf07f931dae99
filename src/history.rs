//! Durable Target -> TargetState map.
//!
//! One JSON file, read once at startup and atomically rewritten after each
//! cycle (write to a temp file, then rename, so a concurrent reader never
//! sees a partial write). Missing or corrupt file at startup is an empty
//! map, not an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

/// Latest known snapshot for one target. Overwritten unconditionally on
/// every successful fetch, not only on detected change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    pub raw_html: String,
    /// Normalized comparison text (see `normalize::comparison_text`).
    pub text: String,
    /// Ordered media references attached to the content.
    #[serde(default)]
    pub media_refs: Vec<String>,
}

#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    inner: Mutex<HashMap<String, TargetState>>,
}

impl HistoryStore {
    /// Read the store from disk. Absence or corruption yields an empty map.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let map = match std::fs::read_to_string(&path) {
            Ok(s) => match serde_json::from_str::<HashMap<String, TargetState>>(&s) {
                Ok(m) => {
                    tracing::info!(entries = m.len(), path = %path.display(), "history loaded");
                    m
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "history corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => {
                tracing::info!(path = %path.display(), "no history file, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            inner: Mutex::new(map),
        }
    }

    pub fn get(&self, target: &str) -> Option<TargetState> {
        self.inner
            .lock()
            .expect("history mutex poisoned")
            .get(target)
            .cloned()
    }

    pub fn put(&self, target: &str, state: TargetState) {
        self.inner
            .lock()
            .expect("history mutex poisoned")
            .insert(target.to_string(), state);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("history mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically rewrite the backing file with the current map.
    pub async fn save(&self) -> Result<()> {
        let snapshot = {
            let map = self.inner.lock().expect("history mutex poisoned");
            serde_json::to_vec_pretty(&*map).context("serialize history")?
        };
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("create {}", dir.display()))?;
            }
        }
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, &snapshot)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} -> {}", tmp.display(), self.path.display()))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}
