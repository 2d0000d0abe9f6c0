//! Storage Discovery Components
//!
//! Device enumeration, classification and capacity resolution for block
//! storage.

pub mod classifier;
pub mod enumerator;
pub mod mounts;
pub mod scanner;

/// Device subsystem holding disks and their partitions.
pub const BLOCK_SUBSYSTEM: &str = "block";

/// Bytes per sector in the `size` sysattr, whatever the device's real
/// logical block size.
pub const SECTOR_SIZE: f64 = 512.0;
