//! Storage Registry
//!
//! Authoritative in-memory view of the storage units attached to the host.
//!
//! Writes stay inside the crate: the monitor seeds and updates it, and a
//! rescan replaces it only while no watch task is running. Any number of
//! query callers read concurrently. Every read copies out under the lock, so a reader never
//! observes a half-applied update.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{DeviceId, ReportableUnit, StorageUnit};
use crate::error::{Error, Result};

/// Registry of known storage units keyed by device number.
#[derive(Debug, Default)]
pub struct StorageRegistry {
    units: RwLock<BTreeMap<DeviceId, StorageUnit>>,
}

impl StorageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit, or replace the whole entry if its id is already known.
    ///
    /// Returns the replaced unit, if any.
    pub(crate) fn upsert(&self, unit: StorageUnit) -> Option<StorageUnit> {
        debug!(id = unit.id, name = %unit.name, "Registry upsert");
        self.units.write().insert(unit.id, unit)
    }

    /// Remove a unit by id, returning it if it was present.
    pub(crate) fn remove(&self, id: DeviceId) -> Option<StorageUnit> {
        debug!(id, "Registry remove");
        self.units.write().remove(&id)
    }

    /// Replace the entire contents in one step.
    pub(crate) fn replace_all(&self, units: Vec<StorageUnit>) {
        let map: BTreeMap<DeviceId, StorageUnit> =
            units.into_iter().map(|unit| (unit.id, unit)).collect();
        *self.units.write() = map;
    }

    /// Look up one unit.
    pub fn get(&self, id: DeviceId) -> Option<StorageUnit> {
        self.units.read().get(&id).cloned()
    }

    /// Point-in-time copy of every unit, in ascending id order.
    pub fn snapshot(&self) -> Vec<StorageUnit> {
        self.units.read().values().cloned().collect()
    }

    /// Number of units, including ones that are not reportable.
    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    /// Whether the registry holds no units.
    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }

    /// Units as reported to callers: zero-capacity units are left out.
    ///
    /// Fails with [`Error::NoDevices`] if the registry is empty.
    pub fn list_reportable_units(&self) -> Result<Vec<ReportableUnit>> {
        let units = self.units.read();
        if units.is_empty() {
            return Err(Error::NoDevices);
        }

        Ok(units
            .values()
            .filter(|unit| unit.is_reportable())
            .map(ReportableUnit::from)
            .collect())
    }
}
