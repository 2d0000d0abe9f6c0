//! Storage Monitor
//!
//! Keeps the registry in step with hotplug events and notifies the
//! subscriber when the set of units changes.
//!
//! # State Machine
//!
//! ```text
//! Stopped ──start()──▶ Initializing ──channel open + seeded──▶ Watching
//!    ▲                      │                                    │
//!    └──── setup failure ───┘◀──── stop() / channel failure ─────┘
//! ```
//!
//! Change detection compares the registry's element count before and after
//! each event: an "add" that re-states a known device replaces its entry
//! but does not notify.

mod status;

pub use status::{MonitorState, MonitorStats, MonitorStatus};

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    ChangeNotifier, DeviceSubsystem, HotplugAction, HotplugEvent, HotplugStream,
    StorageChangedEvent,
};
use crate::error::{Error, Result};
use crate::hardware::{StorageScanner, BLOCK_SUBSYSTEM};
use crate::registry::StorageRegistry;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the monitor loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Idle delay after skipping a malformed event
    pub malformed_event_delay: Duration,

    /// Delay before waiting on the channel again after a hard failure
    pub channel_retry_delay: Duration,

    /// Consecutive hard channel failures tolerated before the loop stops
    pub max_channel_errors: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            malformed_event_delay: Duration::from_millis(1),
            channel_retry_delay: Duration::from_secs(1),
            max_channel_errors: 3,
        }
    }
}

// =============================================================================
// Monitor
// =============================================================================

struct WatchTask {
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

/// Owns the background watch task and its lifecycle.
pub struct StorageMonitor {
    config: MonitorConfig,
    subsystem: Arc<dyn DeviceSubsystem>,
    scanner: StorageScanner,
    registry: Arc<StorageRegistry>,
    notifier: Arc<dyn ChangeNotifier>,
    stats: Arc<MonitorStats>,
    task: tokio::sync::Mutex<Option<WatchTask>>,
}

impl StorageMonitor {
    pub fn new(
        config: MonitorConfig,
        subsystem: Arc<dyn DeviceSubsystem>,
        scanner: StorageScanner,
        registry: Arc<StorageRegistry>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            config,
            subsystem,
            scanner,
            registry,
            notifier,
            stats: Arc::new(MonitorStats::default()),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MonitorState {
        self.stats.state()
    }

    /// State and counters.
    pub fn status(&self) -> MonitorStatus {
        self.stats.status()
    }

    /// Open the hotplug channel, seed the registry and start watching.
    ///
    /// A no-op while already watching. Setup failures are returned and
    /// leave the monitor `Stopped`.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;

        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("Storage monitor already running");
                return Ok(());
            }
        }
        if let Some(finished) = task.take() {
            if let Ok(Err(e)) = finished.handle.await {
                debug!("Previous watch ended with: {}", e);
            }
        }

        info!("Starting storage monitor");
        self.stats.set_state(MonitorState::Initializing);

        let stream = match self.initialize().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Storage monitor initialization failed: {}", e);
                self.stats.record_error(&e);
                self.stats.set_state(MonitorState::Stopped);
                return Err(e);
            }
        };

        self.stats.set_state(MonitorState::Watching);
        info!(
            "Storage monitor watching, {} units registered",
            self.registry.len()
        );

        let cancel = CancellationToken::new();
        let watcher = Watcher {
            config: self.config.clone(),
            scanner: self.scanner.clone(),
            registry: Arc::clone(&self.registry),
            notifier: Arc::clone(&self.notifier),
            stats: Arc::clone(&self.stats),
            cancel: cancel.clone(),
        };

        *task = Some(WatchTask {
            cancel,
            handle: tokio::spawn(watcher.run(stream)),
        });
        Ok(())
    }

    /// Cancel the watch task and wait for it to finish.
    ///
    /// Returns the error the loop ended with, if it stopped on its own
    /// because of a channel failure.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };

        task.cancel.cancel();
        let result = task
            .handle
            .await
            .map_err(|e| Error::Internal(format!("Storage monitor task failed: {}", e)))?;

        self.stats.set_state(MonitorState::Stopped);
        result
    }

    /// Rescan the host and replace the registry contents.
    ///
    /// Rejected with [`Error::MonitorRunning`] while the watch task is
    /// alive, since the loop must stay the only writer while it compares
    /// registry sizes. Returns the number of units found.
    #[instrument(skip(self))]
    pub async fn rescan(&self) -> Result<usize> {
        let task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return Err(Error::MonitorRunning);
        }

        let units = self.scanner.scan().await?;
        let count = units.len();
        self.registry.replace_all(units);
        drop(task);

        info!("Registry refreshed with {} units", count);
        Ok(count)
    }

    async fn initialize(&self) -> Result<Box<dyn HotplugStream>> {
        // Subscribe before scanning so devices that appear mid-scan still
        // produce an event.
        let stream = self
            .subsystem
            .subscribe(BLOCK_SUBSYSTEM)
            .await
            .map_err(|e| match e {
                Error::Initialization(_) => e,
                other => Error::Initialization(other.to_string()),
            })?;

        let units = self.scanner.scan().await?;
        self.registry.replace_all(units);
        Ok(stream)
    }
}

impl Drop for StorageMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for StorageMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageMonitor")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// Watch Loop
// =============================================================================

/// State shared by the background task's event handlers.
///
/// Handlers hold `&Watcher` across awaits, so it must stay `Sync`; the
/// hotplug stream is owned by `run` instead.
struct Watcher {
    config: MonitorConfig,
    scanner: StorageScanner,
    registry: Arc<StorageRegistry>,
    notifier: Arc<dyn ChangeNotifier>,
    stats: Arc<MonitorStats>,
    cancel: CancellationToken,
}

impl Watcher {
    async fn run(self, mut stream: Box<dyn HotplugStream>) -> Result<()> {
        let result = self.watch(stream.as_mut()).await;

        if let Err(e) = &result {
            error!("Storage monitor stopped: {}", e);
            self.stats.record_error(e);
        } else {
            info!("Storage monitor shutting down");
        }
        self.stats.set_state(MonitorState::Stopped);
        result
    }

    async fn watch(&self, stream: &mut dyn HotplugStream) -> Result<()> {
        let mut consecutive_failures = 0u32;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                next = stream.next_event() => next,
            };

            match next {
                Ok(Some(event)) => {
                    consecutive_failures = 0;
                    self.handle_event(event).await;
                }
                Ok(None) => return Err(Error::ChannelClosed),
                Err(e) if e.is_recoverable_event_error() => {
                    MonitorStats::incr(&self.stats.malformed_events);
                    debug!("Skipping event: {}", e);
                    if !self.pause(self.config.malformed_event_delay).await {
                        return Ok(());
                    }
                }
                Err(e) => {
                    MonitorStats::incr(&self.stats.channel_errors);
                    consecutive_failures += 1;
                    if consecutive_failures > self.config.max_channel_errors {
                        return Err(e);
                    }
                    warn!(
                        "Hotplug channel error ({}/{}): {}",
                        consecutive_failures, self.config.max_channel_errors, e
                    );
                    if !self.pause(self.config.channel_retry_delay).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep for `delay`; false if cancelled first.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn handle_event(&self, event: HotplugEvent) {
        let before = self.registry.len();
        let device = &event.device;

        match &event.action {
            HotplugAction::Add => match self.scanner.classify_device(device).await {
                Ok(Some(unit)) => {
                    debug!(id = unit.id, unit_type = %unit.unit_type, "Device added");
                    self.registry.upsert(unit);
                }
                Ok(None) => debug!("Ignoring non-storage device {}", device.sysname),
                Err(e) => warn!("Cannot classify {}: {}", device.sysname, e),
            },
            HotplugAction::Remove => {
                if self.registry.remove(device.devnum).is_some() {
                    debug!(id = device.devnum, "Device removed");
                }
            }
            HotplugAction::Other(action) => {
                MonitorStats::incr(&self.stats.events_ignored);
                debug!("Ignoring '{}' event for {}", action, device.sysname);
                return;
            }
        }
        MonitorStats::incr(&self.stats.events_processed);

        if self.registry.len() != before {
            self.notify().await;
        }
    }

    async fn notify(&self) {
        let units = self.registry.list_reportable_units().unwrap_or_default();
        info!("Storage units changed, {} reportable", units.len());

        match self.notifier.notify(StorageChangedEvent::new(units)).await {
            Ok(()) => MonitorStats::incr(&self.stats.notifications_sent),
            Err(e) => {
                MonitorStats::incr(&self.stats.notifications_failed);
                warn!("Change notification dropped: {}", e);
            }
        }
    }
}
