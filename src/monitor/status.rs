//! Monitor state and counters.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// Lifecycle state of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    /// No background task
    Stopped,
    /// Opening the hotplug channel and seeding the registry
    Initializing,
    /// Applying hotplug events
    Watching,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Stopped => write!(f, "stopped"),
            MonitorState::Initializing => write!(f, "initializing"),
            MonitorState::Watching => write!(f, "watching"),
        }
    }
}

/// Counters shared between the monitor handle and its background task.
#[derive(Debug)]
pub struct MonitorStats {
    state: RwLock<MonitorState>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,

    /// Add/remove events applied to the registry
    pub events_processed: AtomicU64,

    /// Events with an action other than add/remove
    pub events_ignored: AtomicU64,

    /// Events skipped as malformed
    pub malformed_events: AtomicU64,

    /// Hard channel failures seen while watching
    pub channel_errors: AtomicU64,

    /// Change events delivered to the notifier
    pub notifications_sent: AtomicU64,

    /// Change events the notifier rejected
    pub notifications_failed: AtomicU64,
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self {
            state: RwLock::new(MonitorState::Stopped),
            started_at: RwLock::new(None),
            last_error: RwLock::new(None),
            events_processed: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            malformed_events: AtomicU64::new(0),
            channel_errors: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_failed: AtomicU64::new(0),
        }
    }
}

impl MonitorStats {
    pub fn state(&self) -> MonitorState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: MonitorState) {
        *self.state.write() = state;
        if state == MonitorState::Watching {
            *self.started_at.write() = Some(Utc::now());
        }
    }

    pub(crate) fn record_error(&self, error: &crate::Error) {
        *self.last_error.write() = Some(error.to_string());
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the state and counters.
    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            state: self.state(),
            started_at: *self.started_at.read(),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            malformed_events: self.malformed_events.load(Ordering::Relaxed),
            channel_errors: self.channel_errors.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }
}

/// Snapshot of the monitor's state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub state: MonitorState,
    /// When the monitor last entered `Watching`
    pub started_at: Option<DateTime<Utc>>,
    pub events_processed: u64,
    pub events_ignored: u64,
    pub malformed_events: u64,
    pub channel_errors: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    /// Last setup or channel failure, if any
    pub last_error: Option<String>,
}
