//! Sysfs Device Subsystem
//!
//! Reads block devices from `/sys/class/<subsystem>` and detects hotplug by
//! rescanning that directory on an interval.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::domain::{DeviceId, DeviceSubsystem, HotplugEvent, HotplugStream, RawDevice};
use crate::error::{Error, Result};

/// Configuration for the sysfs subsystem
#[derive(Debug, Clone)]
pub struct SysfsConfig {
    /// sysfs mount point
    pub sys_root: PathBuf,
    /// Directory device nodes live in
    pub dev_root: PathBuf,
    /// How often the hotplug stream rescans for changes
    pub poll_interval: Duration,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            sys_root: PathBuf::from("/sys"),
            dev_root: PathBuf::from("/dev"),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Device subsystem backed by sysfs.
#[derive(Debug, Clone, Default)]
pub struct SysfsSubsystem {
    config: SysfsConfig,
}

impl SysfsSubsystem {
    pub fn new(config: SysfsConfig) -> Self {
        Self { config }
    }

    fn class_dir(&self, subsystem: &str) -> PathBuf {
        self.config.sys_root.join("class").join(subsystem)
    }

    /// Read one device directory (e.g., /sys/class/block/sda).
    pub fn read_device(&self, dir: &Path) -> Result<RawDevice> {
        let sysname = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::MalformedEvent(format!("no device name in {}", dir.display())))?;

        let dev = read_attr(dir, "dev")
            .ok_or_else(|| Error::MalformedEvent(format!("{}: missing dev attribute", sysname)))?;
        let devnum = parse_dev(&dev)
            .ok_or_else(|| Error::MalformedEvent(format!("{}: invalid dev {:?}", sysname, dev)))?;

        let devname = read_uevent_devname(dir).unwrap_or_else(|| sysname.clone());
        let devnode = self.config.dev_root.join(devname);

        Ok(RawDevice {
            devnum,
            devnode: Some(devnode.to_string_lossy().into_owned()),
            removable: read_attr(dir, "removable"),
            capability: read_attr(dir, "capability"),
            size: read_attr(dir, "size"),
            sysname,
        })
    }

    fn scan(&self, subsystem: &str) -> Result<Vec<RawDevice>> {
        let class_dir = self.class_dir(subsystem);
        let entries = fs::read_dir(&class_dir).map_err(|e| {
            Error::Initialization(format!("cannot open {}: {}", class_dir.display(), e))
        })?;

        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry?;
            match self.read_device(&entry.path()) {
                Ok(device) => devices.push(device),
                Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
            }
        }

        devices.sort_by(|a, b| a.sysname.cmp(&b.sysname));
        Ok(devices)
    }

    async fn scan_blocking(&self, subsystem: &str) -> Result<Vec<RawDevice>> {
        let this = self.clone();
        let name = subsystem.to_string();
        tokio::task::spawn_blocking(move || this.scan(&name))
            .await
            .map_err(|e| Error::Internal(format!("sysfs scan task failed: {}", e)))?
    }
}

#[async_trait]
impl DeviceSubsystem for SysfsSubsystem {
    fn enumerate(&self, subsystem: &str) -> Result<Vec<RawDevice>> {
        self.scan(subsystem)
    }

    async fn subscribe(&self, subsystem: &str) -> Result<Box<dyn HotplugStream>> {
        let known = self
            .scan_blocking(subsystem)
            .await?
            .into_iter()
            .map(|device| (device.devnum, device))
            .collect();

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "Watching {} every {:?}",
            self.class_dir(subsystem).display(),
            self.config.poll_interval
        );

        Ok(Box::new(SysfsPollingStream {
            subsystem: self.clone(),
            name: subsystem.to_string(),
            known,
            pending: VecDeque::new(),
            ticker,
        }))
    }
}

/// Hotplug stream that diffs successive sysfs scans.
struct SysfsPollingStream {
    subsystem: SysfsSubsystem,
    name: String,
    known: HashMap<DeviceId, RawDevice>,
    pending: VecDeque<HotplugEvent>,
    ticker: Interval,
}

impl SysfsPollingStream {
    fn apply_scan(&mut self, devices: Vec<RawDevice>) {
        let current: HashMap<DeviceId, RawDevice> = devices
            .into_iter()
            .map(|device| (device.devnum, device))
            .collect();

        // A changed device is reported as a removal followed by an addition
        let mut removed: Vec<&RawDevice> = self
            .known
            .iter()
            .filter(|(devnum, known)| {
                current
                    .get(*devnum)
                    .map_or(true, |now| !same_media(known, now))
            })
            .map(|(_, device)| device)
            .collect();
        removed.sort_by_key(|device| device.devnum);

        let mut added: Vec<&RawDevice> = current
            .iter()
            .filter(|(devnum, now)| {
                self.known
                    .get(*devnum)
                    .map_or(true, |known| !same_media(known, now))
            })
            .map(|(_, device)| device)
            .collect();
        added.sort_by_key(|device| device.devnum);

        self.pending
            .extend(removed.into_iter().cloned().map(HotplugEvent::remove));
        self.pending
            .extend(added.into_iter().cloned().map(HotplugEvent::add));

        self.known = current;
    }
}

#[async_trait]
impl HotplugStream for SysfsPollingStream {
    async fn next_event(&mut self) -> Result<Option<HotplugEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            self.ticker.tick().await;

            let devices = self.subsystem.scan_blocking(&self.name).await?;
            self.apply_scan(devices);
        }
    }
}

/// Whether two scans of one device number show the same media.
///
/// The kernel reuses a device number when one stick replaces another
/// between polls.
fn same_media(before: &RawDevice, after: &RawDevice) -> bool {
    before.size == after.size
        && before.removable == after.removable
        && before.capability == after.capability
}

fn read_attr(dir: &Path, name: &str) -> Option<String> {
    fs::read_to_string(dir.join(name))
        .ok()
        .map(|value| value.trim().to_string())
}

fn read_uevent_devname(dir: &Path) -> Option<String> {
    let uevent = fs::read_to_string(dir.join("uevent")).ok()?;
    uevent
        .lines()
        .find_map(|line| line.strip_prefix("DEVNAME="))
        .map(|name| name.trim().to_string())
}

/// Parse a `major:minor` pair into a device number.
fn parse_dev(value: &str) -> Option<DeviceId> {
    let (major, minor) = value.trim().split_once(':')?;
    Some(make_devnum(major.parse().ok()?, minor.parse().ok()?))
}

/// Encode major/minor the way glibc's `makedev` does on Linux.
pub fn make_devnum(major: u64, minor: u64) -> DeviceId {
    ((major & 0xffff_f000) << 32)
        | ((major & 0x0000_0fff) << 8)
        | ((minor & 0xffff_ff00) << 12)
        | (minor & 0x0000_00ff)
}
