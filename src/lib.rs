// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod alert;
pub mod config;
pub mod detector;
pub mod error;
pub mod history;
pub mod metrics;
pub mod normalize;
pub mod notify;
pub mod orchestrator;
pub mod retry;
pub mod session;

// ---- Re-exports for stable public API ----
pub use crate::config::Config;
pub use crate::error::{FetchError, SessionError};
pub use crate::history::{HistoryStore, TargetState};
pub use crate::notify::{NotificationEvent, Notifier, NotifierMux};
pub use crate::orchestrator::{Orchestrator, RunState};
pub use crate::session::{
    Cookie, FetchOutcome, HttpSessionBackend, SessionBackend, SessionHandle,
};
