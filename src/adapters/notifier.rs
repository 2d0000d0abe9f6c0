//! Change Notifier Adapters
//!
//! Implements the `ChangeNotifier` port with various sinks.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tracing::info;

use crate::domain::{ChangeNotifier, StorageChangedEvent};
use crate::error::{Error, Result};

/// Logging-based notifier.
///
/// Writes each change event to the tracing/logging system at info level.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChangeNotifier for LoggingNotifier {
    async fn notify(&self, event: StorageChangedEvent) -> Result<()> {
        let units = event.units().len();
        let json = serde_json::to_string(&event)?;

        info!(prop = %event.prop, units, event = %json, "Storage changed");
        Ok(())
    }
}

/// Channel-backed notifier feeding a single subscriber.
///
/// Sends never wait: when the subscriber falls behind and the channel is
/// full, the event is dropped and reported as an error.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<StorageChangedEvent>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end for the subscriber.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StorageChangedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ChangeNotifier for ChannelNotifier {
    async fn notify(&self, event: StorageChangedEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::Internal("Subscriber channel full, change event dropped".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::Internal("Subscriber channel closed".to_string())
            }
        })
    }
}

/// In-memory event collector for testing.
///
/// Collects events in memory for later inspection during tests.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    events: RwLock<Vec<StorageChangedEvent>>,
    delivered: Notify,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<StorageChangedEvent> {
        self.events.read().clone()
    }

    /// Get the count of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if there are no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Wait until at least `count` events have been collected.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let delivered = self.delivered.notified();
                if self.len() >= count {
                    return;
                }
                delivered.await;
            }
        };

        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl ChangeNotifier for InMemoryNotifier {
    async fn notify(&self, event: StorageChangedEvent) -> Result<()> {
        self.events.write().push(event);
        self.delivered.notify_waiters();
        Ok(())
    }
}
