//! Device Classification
//!
//! Turns the raw sysattrs of a block device into a typed storage unit.

use crate::domain::{RawDevice, StorageUnit, UnitType, AVAILABLE_NOT_COMPUTED};
use crate::error::{Error, Result};

use super::SECTOR_SIZE;

/// `capability` code of a regular disk device (sda, sdb, ...).
pub const CAPABILITY_DISK: i32 = 50;

/// `capability` code of USB flash drives and SD cards.
pub const CAPABILITY_FLASH: i32 = 51;

/// Check whether a device with these sysattrs is a storage device we track.
///
/// All three attributes must be present and the capability must be one of
/// the two recognized codes.
pub fn is_storage_device(
    removable: Option<&str>,
    capability: Option<&str>,
    size: Option<&str>,
) -> bool {
    let (Some(_), Some(capability), Some(_)) = (removable, capability, size) else {
        return false;
    };

    matches!(
        capability.trim().parse::<i32>(),
        Ok(CAPABILITY_DISK) | Ok(CAPABILITY_FLASH)
    )
}

/// [`is_storage_device`] applied to a raw device.
pub fn is_storage_raw_device(raw: &RawDevice) -> bool {
    is_storage_device(
        raw.removable.as_deref(),
        raw.capability.as_deref(),
        raw.size.as_deref(),
    )
}

/// Classify a raw device into a storage-unit draft.
///
/// Internal disks come back with zero capacity: their figures come from the
/// root mount and are filled in by the scanner. Removable flash and every
/// unrecognized combination (disk-but-removable, flash-but-fixed) are sized
/// from the sector count, with available capacity left uncomputed.
pub fn classify(raw: &RawDevice) -> Result<StorageUnit> {
    let removable = parse_attr::<i64>(raw, "removable", raw.removable.as_deref())?;
    let capability = parse_attr::<i32>(raw, "capability", raw.capability.as_deref())?;
    let is_removable = removable == 1;

    let mut unit = StorageUnit {
        id: raw.devnum,
        name: raw.node_path(),
        unit_type: UnitType::Unknown,
        is_removable,
        capacity: 0.0,
        available_capacity: 0.0,
        capability,
    };

    match (capability, is_removable) {
        (CAPABILITY_DISK, false) => {
            unit.unit_type = UnitType::Internal;
        }
        (CAPABILITY_FLASH, true) => {
            unit.unit_type = UnitType::UsbHost;
            unit.capacity = sector_capacity(raw)?;
            unit.available_capacity = AVAILABLE_NOT_COMPUTED;
        }
        _ => {
            unit.unit_type = UnitType::Unknown;
            unit.capacity = sector_capacity(raw)?;
            unit.available_capacity = AVAILABLE_NOT_COMPUTED;
        }
    }

    Ok(unit)
}

fn sector_capacity(raw: &RawDevice) -> Result<f64> {
    let sectors = parse_attr::<f64>(raw, "size", raw.size.as_deref())?;
    Ok(sectors * SECTOR_SIZE)
}

fn parse_attr<T: std::str::FromStr>(raw: &RawDevice, name: &str, value: Option<&str>) -> Result<T> {
    let value = value.ok_or_else(|| {
        Error::MalformedEvent(format!("{}: missing sysattr '{}'", raw.sysname, name))
    })?;

    value.trim().parse::<T>().map_err(|_| {
        Error::MalformedEvent(format!(
            "{}: invalid sysattr '{}' = {:?}",
            raw.sysname, name, value
        ))
    })
}
