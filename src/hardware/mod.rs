//! Hardware Discovery Module
//!
//! Detection of block storage devices attached to the host.
//!
//! # Features
//!
//! - Block device enumeration from the device subsystem
//! - Classification into internal disks, USB flash and unrecognized devices
//! - Internal-disk capacity from the root filesystem, with a bounded read
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use blockwatch::adapters::{ProcMounts, SysfsSubsystem};
//! use blockwatch::hardware::{MountResolverConfig, StorageScanner};
//!
//! # async fn example() -> blockwatch::Result<()> {
//! let scanner = StorageScanner::from_ports(
//!     Arc::new(SysfsSubsystem::default()),
//!     Arc::new(ProcMounts::default()),
//!     MountResolverConfig::default(),
//! );
//!
//! for unit in scanner.scan().await? {
//!     println!("  {} - {} ({} bytes)", unit.name, unit.unit_type, unit.capacity);
//! }
//! # Ok(())
//! # }
//! ```

pub mod discovery;

pub use discovery::{
    classifier::{classify, is_storage_device, CAPABILITY_DISK, CAPABILITY_FLASH},
    enumerator::DeviceEnumerator,
    mounts::{resolve_internal_capacity, Capacity, MountResolver, MountResolverConfig},
    scanner::StorageScanner,
    BLOCK_SUBSYSTEM, SECTOR_SIZE,
};
