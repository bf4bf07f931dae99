//! Per-target fetch-and-compare step.
//!
//! The detector borrows the session handle for one bounded fetch,
//! normalizes what came back, compares against the last persisted state,
//! and unconditionally writes the fresh snapshot back so a missed
//! comparison can never compound across cycles.

use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;
use crate::history::{HistoryStore, TargetState};
use crate::normalize;
use crate::session::{FetchOutcome, SessionHandle};

/// Outcome of one successful check.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub target: String,
    /// True only when a previous text existed and differs from the
    /// current one. The first-ever observation is never a change.
    pub changed: bool,
    pub state: TargetState,
    pub previous: Option<TargetState>,
}

pub struct ChangeDetector {
    history: Arc<HistoryStore>,
    fetch_timeout: Duration,
}

impl ChangeDetector {
    pub fn new(history: Arc<HistoryStore>, fetch_timeout: Duration) -> Self {
        Self {
            history,
            fetch_timeout,
        }
    }

    /// Check one target. `Ok(None)` means the pinned content was absent
    /// (sentinel, nothing written). Text differences drive `changed`;
    /// media-reference differences are logged but do not trigger.
    pub async fn check(
        &self,
        session: &dyn SessionHandle,
        target: &str,
    ) -> Result<Option<CheckReport>, FetchError> {
        let outcome = tokio::time::timeout(self.fetch_timeout, session.fetch(target))
            .await
            .map_err(|_| FetchError::Timeout(self.fetch_timeout))??;

        let raw_html = match outcome {
            FetchOutcome::Content(html) => html,
            FetchOutcome::NotFound => {
                tracing::warn!(target, "pinned content not found");
                return Ok(None);
            }
        };

        let state = TargetState {
            text: normalize::comparison_text(&raw_html),
            media_refs: normalize::media_refs(&raw_html),
            raw_html,
        };

        let previous = self.history.get(target);
        let changed = match &previous {
            Some(prev) if !prev.text.is_empty() => prev.text != state.text,
            _ => false,
        };

        if let Some(prev) = &previous {
            if !changed && prev.media_refs != state.media_refs {
                // recorded for the logs only; text is the authoritative trigger
                tracing::info!(target, "media references changed without text change");
            }
        }

        if changed {
            tracing::info!(target, new_text = %state.text, "pinned content changed");
        } else {
            tracing::debug!(target, "no change");
        }

        self.history.put(target, state.clone());

        Ok(Some(CheckReport {
            target: target.to_string(),
            changed,
            state,
            previous,
        }))
    }
}
