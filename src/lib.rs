//! Blockwatch - Block Storage Monitor
//!
//! Discovers the block storage devices attached to a Linux host, classifies
//! them as internal disks or removable flash media, and keeps an up-to-date
//! registry as devices are hot-plugged. Callers query the registry and a
//! single subscriber is notified whenever the set of units changes.
//!
//! # Architecture
//!
//! ```text
//! DeviceSubsystem ─▶ Enumerator ─▶ Classifier ─▶ MountResolver
//!        │                                             │
//!        ▼ hotplug                                     ▼
//!   StorageMonitor ─────────────▶ StorageRegistry ◀── get()
//!        │
//!        ▼
//!  ChangeNotifier
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - sysfs/procfs bindings, in-memory fakes and notifiers
//! - [`domain`] - Value objects, ports and events
//! - [`error`] - Error types
//! - [`hardware`] - Enumeration, classification and capacity resolution
//! - [`monitor`] - Hotplug watch loop
//! - [`registry`] - Known storage units
//! - [`service`] - Query and listening entry points

pub mod adapters;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod monitor;
pub mod registry;
pub mod service;

// Re-export commonly used types
pub use error::{Error, Result};
pub use hardware::StorageScanner;
pub use monitor::{MonitorConfig, MonitorState, MonitorStatus, StorageMonitor};
pub use registry::StorageRegistry;
pub use service::{QueryResponse, ServiceConfig, StorageService};
