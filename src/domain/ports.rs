//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the storage-unit value objects and the abstractions
//! (ports) the monitor depends on. Infrastructure adapters implement these
//! traits to provide concrete bindings to the OS.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  DeviceSubsystem │ MountTable │ ChangeNotifier      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  SysfsSubsystem │ ProcMounts │ ChannelNotifier      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::StorageChangedEvent;
use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Kernel device number (`dev_t`), the unique key of a storage unit.
pub type DeviceId = u64;

/// Marks an available capacity that was not computed for this unit type.
pub const AVAILABLE_NOT_COMPUTED: f64 = -1.0;

/// Storage unit type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitType {
    /// Fixed internal disk
    Internal,
    /// Removable flash attached to a USB host controller
    UsbHost,
    /// Anything the classifier does not recognize
    Unknown,
    /// MMC/SD card (never produced by the classifier)
    Mmc,
}

impl UnitType {
    /// Token used in query results and notifications.
    ///
    /// Only three tokens are reportable, so `Mmc` reports as `"UNKNOWN"`.
    pub fn report_token(&self) -> &'static str {
        match self {
            UnitType::Internal => "INTERNAL",
            UnitType::UsbHost => "USB_HOST",
            UnitType::Unknown | UnitType::Mmc => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitType::Internal => write!(f, "INTERNAL"),
            UnitType::UsbHost => write!(f, "USB_HOST"),
            UnitType::Unknown => write!(f, "UNKNOWN"),
            UnitType::Mmc => write!(f, "MMC"),
        }
    }
}

/// A classified block storage device.
///
/// Units are replaced as a whole in the registry, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageUnit {
    /// Device number
    pub id: DeviceId,
    /// Device node path (e.g., /dev/sda)
    pub name: String,
    /// Classified type
    pub unit_type: UnitType,
    /// Whether the kernel reports the media as removable
    pub is_removable: bool,
    /// Total capacity in bytes
    pub capacity: f64,
    /// Available capacity in bytes, or [`AVAILABLE_NOT_COMPUTED`]
    pub available_capacity: f64,
    /// Raw capability code the classification was based on
    pub capability: i32,
}

impl StorageUnit {
    /// Whether the unit shows up in query results.
    pub fn is_reportable(&self) -> bool {
        self.capacity != 0.0
    }
}

/// A block device as reported by the device subsystem, before classification.
///
/// Attributes are kept as the raw strings the subsystem exposes; the
/// classifier decides what they mean.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDevice {
    /// Device number
    pub devnum: DeviceId,
    /// Kernel name (e.g., sda)
    pub sysname: String,
    /// Device node path (e.g., /dev/sda)
    pub devnode: Option<String>,
    /// `removable` sysattr
    pub removable: Option<String>,
    /// `capability` sysattr
    pub capability: Option<String>,
    /// `size` sysattr, in 512-byte sectors
    pub size: Option<String>,
}

impl RawDevice {
    /// Device node path, falling back to `/dev/<sysname>`.
    pub fn node_path(&self) -> String {
        self.devnode
            .clone()
            .unwrap_or_else(|| format!("/dev/{}", self.sysname))
    }
}

/// Hotplug action carried by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugAction {
    Add,
    Remove,
    /// Any other action (change, bind, ...), ignored by the monitor
    Other(String),
}

impl From<&str> for HotplugAction {
    fn from(action: &str) -> Self {
        match action {
            "add" => HotplugAction::Add,
            "remove" => HotplugAction::Remove,
            other => HotplugAction::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for HotplugAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HotplugAction::Add => write!(f, "add"),
            HotplugAction::Remove => write!(f, "remove"),
            HotplugAction::Other(action) => write!(f, "{}", action),
        }
    }
}

/// A device attach/detach notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotplugEvent {
    pub action: HotplugAction,
    pub device: RawDevice,
}

impl HotplugEvent {
    pub fn add(device: RawDevice) -> Self {
        Self {
            action: HotplugAction::Add,
            device,
        }
    }

    pub fn remove(device: RawDevice) -> Self {
        Self {
            action: HotplugAction::Remove,
            device,
        }
    }
}

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted filesystem source (e.g., /dev/sda2)
    pub source: String,
    /// Mount point (e.g., /)
    pub mount_point: String,
    /// Filesystem type
    pub fs_type: String,
}

impl MountEntry {
    pub fn new(
        source: impl Into<String>,
        mount_point: impl Into<String>,
        fs_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            mount_point: mount_point.into(),
            fs_type: fs_type.into(),
        }
    }
}

/// Filesystem statistics for a mount point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    /// Filesystem block size
    pub block_size: u64,
    /// Total data blocks
    pub total_blocks: u64,
    /// Blocks available to an unprivileged caller
    pub available_blocks: u64,
}

// =============================================================================
// Device Subsystem Port
// =============================================================================

/// Port for the OS device subsystem.
///
/// Provides enumeration with per-device attributes and a hotplug event
/// channel, both filtered to one subsystem (e.g., "block").
#[async_trait]
pub trait DeviceSubsystem: Send + Sync {
    /// List every device currently present in `subsystem`.
    ///
    /// Fails with [`Error::Initialization`](crate::Error::Initialization) if
    /// the subsystem cannot be opened.
    fn enumerate(&self, subsystem: &str) -> Result<Vec<RawDevice>>;

    /// Open a hotplug event channel for `subsystem`.
    async fn subscribe(&self, subsystem: &str) -> Result<Box<dyn HotplugStream>>;
}

/// A live stream of hotplug events.
#[async_trait]
pub trait HotplugStream: Send {
    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` once the channel has ended. An unusable event is
    /// reported as [`Error::MalformedEvent`](crate::Error::MalformedEvent);
    /// any other error is a channel failure.
    async fn next_event(&mut self) -> Result<Option<HotplugEvent>>;
}

// =============================================================================
// Mount Table Port
// =============================================================================

/// Port for the OS mount table.
///
/// Both calls may block; callers run them off the async executor.
pub trait MountTable: Send + Sync {
    /// Read all mount entries in table order.
    fn entries(&self) -> Result<Vec<MountEntry>>;

    /// Filesystem statistics for a mount point.
    fn stats(&self, mount_point: &Path) -> Result<FsStats>;
}

// =============================================================================
// Notification Port
// =============================================================================

/// Port for delivering registry change events to the subscriber sink.
///
/// Delivery is best-effort: callers log failures and never retry.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Deliver one change event.
    async fn notify(&self, event: StorageChangedEvent) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_type_report_tokens() {
        assert_eq!(UnitType::Internal.report_token(), "INTERNAL");
        assert_eq!(UnitType::UsbHost.report_token(), "USB_HOST");
        assert_eq!(UnitType::Unknown.report_token(), "UNKNOWN");
        assert_eq!(UnitType::Mmc.report_token(), "UNKNOWN");
        assert_eq!(UnitType::Mmc.to_string(), "MMC");
    }

    #[test]
    fn test_hotplug_action_parsing() {
        assert_eq!(HotplugAction::from("add"), HotplugAction::Add);
        assert_eq!(HotplugAction::from("remove"), HotplugAction::Remove);
        assert_eq!(
            HotplugAction::from("change"),
            HotplugAction::Other("change".to_string())
        );
        assert_eq!(HotplugAction::from("change").to_string(), "change");
    }

    #[test]
    fn test_node_path_fallback() {
        let mut device = RawDevice {
            sysname: "sdb".to_string(),
            ..Default::default()
        };
        assert_eq!(device.node_path(), "/dev/sdb");

        device.devnode = Some("/dev/disk/usb0".to_string());
        assert_eq!(device.node_path(), "/dev/disk/usb0");
    }

    #[test]
    fn test_zero_capacity_not_reportable() {
        let unit = StorageUnit {
            id: 2049,
            name: "/dev/sdb".to_string(),
            unit_type: UnitType::UsbHost,
            is_removable: true,
            capacity: 0.0,
            available_capacity: AVAILABLE_NOT_COMPUTED,
            capability: 51,
        };
        assert!(!unit.is_reportable());
    }
}
