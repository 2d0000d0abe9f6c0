//! Storage Scanner
//!
//! Combines enumeration, classification and mount resolution into complete
//! storage units.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::domain::{DeviceSubsystem, MountTable, RawDevice, StorageUnit, UnitType};
use crate::error::{Error, Result};

use super::classifier::{classify, is_storage_raw_device};
use super::enumerator::DeviceEnumerator;
use super::mounts::{Capacity, MountResolver, MountResolverConfig};

/// Builds storage units from the device subsystem and the mount table.
#[derive(Debug, Clone)]
pub struct StorageScanner {
    enumerator: DeviceEnumerator,
    resolver: MountResolver,
}

impl StorageScanner {
    pub fn new(enumerator: DeviceEnumerator, resolver: MountResolver) -> Self {
        Self {
            enumerator,
            resolver,
        }
    }

    /// Create a scanner straight from the two OS ports.
    pub fn from_ports(
        subsystem: Arc<dyn DeviceSubsystem>,
        mounts: Arc<dyn MountTable>,
        config: MountResolverConfig,
    ) -> Self {
        Self::new(
            DeviceEnumerator::new(subsystem),
            MountResolver::new(mounts, config),
        )
    }

    /// Enumerate and classify every storage device currently attached.
    ///
    /// Devices with unusable attributes are skipped. A mount table failure
    /// while sizing an internal disk aborts the whole scan.
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<Vec<StorageUnit>> {
        let mut units = Vec::new();
        let mut root_capacity: Option<Capacity> = None;

        let enumerator = self.enumerator.clone();
        let devices = tokio::task::spawn_blocking(move || enumerator.enumerate_block_devices())
            .await
            .map_err(|e| Error::Internal(format!("Device enumeration task failed: {}", e)))??;

        for raw in devices {
            if !is_storage_raw_device(&raw) {
                continue;
            }

            let unit = match classify(&raw) {
                Ok(unit) => unit,
                Err(e) => {
                    warn!("Skipping {}: {}", raw.sysname, e);
                    continue;
                }
            };

            let unit = if unit.unit_type == UnitType::Internal {
                let capacity = match root_capacity {
                    Some(capacity) => capacity,
                    None => {
                        let capacity = self.resolver.resolve().await?;
                        root_capacity = Some(capacity);
                        capacity
                    }
                };
                with_capacity(unit, capacity)
            } else {
                unit
            };

            debug!(
                id = unit.id,
                name = %unit.name,
                unit_type = %unit.unit_type,
                capacity = unit.capacity,
                "Discovered storage unit"
            );
            units.push(unit);
        }

        info!("Scan found {} storage units", units.len());
        Ok(units)
    }

    /// Classify a single device, e.g. one announced by a hotplug event.
    ///
    /// Returns `Ok(None)` for devices that are not storage devices.
    pub async fn classify_device(&self, raw: &RawDevice) -> Result<Option<StorageUnit>> {
        if !is_storage_raw_device(raw) {
            return Ok(None);
        }

        let unit = classify(raw)?;
        if unit.unit_type != UnitType::Internal {
            return Ok(Some(unit));
        }

        let capacity = self.resolver.resolve().await?;
        Ok(Some(with_capacity(unit, capacity)))
    }
}

fn with_capacity(unit: StorageUnit, capacity: Capacity) -> StorageUnit {
    StorageUnit {
        capacity: capacity.total,
        available_capacity: capacity.available,
        ..unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDeviceSubsystem, StaticMountTable};
    use crate::domain::{FsStats, MountEntry, AVAILABLE_NOT_COMPUTED};
    use assert_matches::assert_matches;

    fn device(devnum: u64, name: &str, removable: &str, capability: &str, size: &str) -> RawDevice {
        RawDevice {
            devnum,
            sysname: name.to_string(),
            devnode: Some(format!("/dev/{}", name)),
            removable: Some(removable.to_string()),
            capability: Some(capability.to_string()),
            size: Some(size.to_string()),
        }
    }

    fn root_table() -> StaticMountTable {
        StaticMountTable::new(vec![MountEntry::new("/dev/sda2", "/", "ext4")]).with_stats(
            "/",
            FsStats {
                block_size: 1000,
                total_blocks: 1_000_000,
                available_blocks: 500_000,
            },
        )
    }

    fn scanner(devices: Vec<RawDevice>, table: StaticMountTable) -> StorageScanner {
        StorageScanner::from_ports(
            Arc::new(InMemoryDeviceSubsystem::new(devices)),
            Arc::new(table),
            MountResolverConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_scan_classifies_and_sizes() {
        let mut partition = device(2049, "sda1", "0", "50", "1000");
        partition.capability = None;

        let scanner = scanner(
            vec![
                device(2048, "sda", "0", "50", "1953525168"),
                partition,
                device(2064, "sdb", "1", "51", "3906250"),
                device(1792, "loop0", "0", "112", "0"),
            ],
            root_table(),
        );

        let units = scanner.scan().await.unwrap();
        assert_eq!(units.len(), 2);

        assert_eq!(units[0].unit_type, UnitType::Internal);
        assert_eq!(units[0].capacity, 1e9);
        assert_eq!(units[0].available_capacity, 5e8);

        assert_eq!(units[1].unit_type, UnitType::UsbHost);
        assert_eq!(units[1].capacity, 2e9);
        assert_eq!(units[1].available_capacity, AVAILABLE_NOT_COMPUTED);
    }

    #[tokio::test]
    async fn test_scan_skips_malformed_devices() {
        let scanner = scanner(
            vec![
                device(2064, "sdb", "yes", "51", "100"),
                device(2080, "sdc", "1", "51", "100"),
            ],
            root_table(),
        );

        let units = scanner.scan().await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].id, 2080);
    }

    #[tokio::test]
    async fn test_scan_fails_without_mount_table() {
        let scanner = scanner(
            vec![device(2048, "sda", "0", "50", "100")],
            StaticMountTable::unavailable(),
        );

        assert_matches!(scanner.scan().await, Err(Error::MountTableUnavailable(_)));
    }

    #[tokio::test]
    async fn test_classify_device_ignores_non_storage() {
        let scanner = scanner(vec![], root_table());
        let loop_dev = device(1792, "loop0", "0", "112", "0");

        assert_eq!(scanner.classify_device(&loop_dev).await.unwrap(), None);

        let disk = device(2048, "sda", "0", "50", "100");
        let unit = scanner.classify_device(&disk).await.unwrap().unwrap();
        assert_eq!(unit.capacity, 1e9);
    }
}
