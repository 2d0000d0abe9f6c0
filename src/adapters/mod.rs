//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  DeviceSubsystem │ HotplugStream │ MountTable │ Notifier   │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ SysfsSubsystem │ ProcMounts │ InMemoryDeviceSubsystem      │ │
//! │  │ StaticMountTable │ ChannelNotifier │ LoggingNotifier       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod memory;
mod notifier;
#[cfg(unix)]
mod procfs;
mod sysfs;

pub use memory::{HotplugSender, InMemoryDeviceSubsystem, StaticMountTable};
pub use notifier::{ChannelNotifier, InMemoryNotifier, LoggingNotifier};
#[cfg(unix)]
pub use procfs::{parse_mounts, ProcMounts, ProcMountsConfig};
pub use sysfs::{make_devnum, SysfsConfig, SysfsSubsystem};
