//! In-Memory Adapters
//!
//! Device subsystem and mount table backed by plain data, for tests and for
//! embedders that feed device information from elsewhere.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::domain::{
    DeviceSubsystem, FsStats, HotplugEvent, HotplugStream, MountEntry, MountTable, RawDevice,
};
use crate::error::{Error, Result};

type EventResult = Result<HotplugEvent>;

// =============================================================================
// Device Subsystem
// =============================================================================

/// Device subsystem holding a fixed device list and a channel-fed hotplug
/// stream.
pub struct InMemoryDeviceSubsystem {
    devices: RwLock<Vec<RawDevice>>,
    available: bool,
    subscribe_fails: bool,
    tx: mpsc::UnboundedSender<EventResult>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<EventResult>>>,
}

impl InMemoryDeviceSubsystem {
    /// Create a subsystem that enumerates `devices`.
    pub fn new(devices: Vec<RawDevice>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            devices: RwLock::new(devices),
            available: true,
            subscribe_fails: false,
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }

    /// Create a subsystem that cannot be opened.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    /// Make `subscribe` fail while enumeration keeps working.
    pub fn with_subscribe_failure(mut self) -> Self {
        self.subscribe_fails = true;
        self
    }

    /// Replace the device list seen by later enumerations.
    pub fn set_devices(&self, devices: Vec<RawDevice>) {
        *self.devices.write() = devices;
    }

    /// Handle for pushing events into the hotplug stream.
    pub fn event_sender(&self) -> HotplugSender {
        HotplugSender {
            tx: self.tx.clone(),
        }
    }
}

impl std::fmt::Debug for InMemoryDeviceSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDeviceSubsystem")
            .field("devices", &self.devices.read().len())
            .field("available", &self.available)
            .finish()
    }
}

#[async_trait]
impl DeviceSubsystem for InMemoryDeviceSubsystem {
    fn enumerate(&self, subsystem: &str) -> Result<Vec<RawDevice>> {
        if !self.available {
            return Err(Error::Initialization(format!(
                "device subsystem '{}' unavailable",
                subsystem
            )));
        }
        Ok(self.devices.read().clone())
    }

    async fn subscribe(&self, subsystem: &str) -> Result<Box<dyn HotplugStream>> {
        if !self.available || self.subscribe_fails {
            return Err(Error::Initialization(format!(
                "cannot open hotplug channel for '{}'",
                subsystem
            )));
        }
        Ok(Box::new(ChannelHotplugStream {
            rx: Arc::clone(&self.rx),
        }))
    }
}

/// Sending side of an in-memory hotplug stream.
#[derive(Debug, Clone)]
pub struct HotplugSender {
    tx: mpsc::UnboundedSender<EventResult>,
}

impl HotplugSender {
    pub fn send(&self, event: HotplugEvent) -> Result<()> {
        self.send_result(Ok(event))
    }

    pub fn send_add(&self, device: RawDevice) -> Result<()> {
        self.send(HotplugEvent::add(device))
    }

    pub fn send_remove(&self, device: RawDevice) -> Result<()> {
        self.send(HotplugEvent::remove(device))
    }

    /// Deliver an error in place of an event.
    pub fn send_error(&self, error: Error) -> Result<()> {
        self.send_result(Err(error))
    }

    fn send_result(&self, result: EventResult) -> Result<()> {
        self.tx
            .send(result)
            .map_err(|_| Error::Internal("hotplug stream receiver dropped".to_string()))
    }
}

struct ChannelHotplugStream {
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<EventResult>>>,
}

#[async_trait]
impl HotplugStream for ChannelHotplugStream {
    async fn next_event(&mut self) -> Result<Option<HotplugEvent>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}

// =============================================================================
// Mount Table
// =============================================================================

/// Mount table with fixed entries and per-mount-point statistics.
#[derive(Debug, Default)]
pub struct StaticMountTable {
    entries: Vec<MountEntry>,
    stats: HashMap<String, FsStats>,
    unavailable: bool,
    delay: Option<Duration>,
    statted: Mutex<Vec<String>>,
}

impl StaticMountTable {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    /// Create a table whose reads always fail.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// Set the statistics reported for `mount_point`.
    pub fn with_stats(mut self, mount_point: impl Into<String>, stats: FsStats) -> Self {
        self.stats.insert(mount_point.into(), stats);
        self
    }

    /// Block every read of the entries for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Mount points `stats` was called for, in call order.
    pub fn statted(&self) -> Vec<String> {
        self.statted.lock().clone()
    }
}

impl MountTable for StaticMountTable {
    fn entries(&self) -> Result<Vec<MountEntry>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.unavailable {
            return Err(Error::MountTableUnavailable(
                "mount table unavailable".to_string(),
            ));
        }
        Ok(self.entries.clone())
    }

    fn stats(&self, mount_point: &Path) -> Result<FsStats> {
        let key = mount_point.to_string_lossy().into_owned();
        self.statted.lock().push(key.clone());
        self.stats.get(&key).copied().ok_or_else(|| {
            Error::MountTableUnavailable(format!("no filesystem statistics for {}", key))
        })
    }
}
