//! Domain Events
//!
//! Wire shapes for what leaves the monitor: the per-unit record returned by
//! queries and the change event pushed to the subscriber.
//!
//! # Example
//!
//! ```ignore
//! let units = registry.list_reportable_units()?;
//! notifier.notify(StorageChangedEvent::new(units)).await?;
//! ```

use serde::{Deserialize, Serialize};

use super::ports::StorageUnit;

/// Command name carried by every change notification.
pub const PROPERTY_CHANGED_CMD: &str = "SystemInfoPropertyValueChanged";

/// Property label carried by every change notification.
pub const STORAGE_PROP: &str = "STORAGE";

/// A storage unit as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportableUnit {
    pub capacity: f64,
    pub available_capacity: f64,
    #[serde(rename = "type")]
    pub unit_type: String,
    /// Deprecated spelling, kept for older consumers
    pub is_removeable: bool,
    pub is_removable: bool,
}

impl From<&StorageUnit> for ReportableUnit {
    fn from(unit: &StorageUnit) -> Self {
        Self {
            capacity: unit.capacity,
            available_capacity: unit.available_capacity,
            unit_type: unit.unit_type.report_token().to_string(),
            is_removeable: unit.is_removable,
            is_removable: unit.is_removable,
        }
    }
}

/// `data` section of a change event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitsPayload {
    pub units: Vec<ReportableUnit>,
}

/// Event delivered to the subscriber when the set of known units changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageChangedEvent {
    pub cmd: String,
    pub prop: String,
    pub data: UnitsPayload,
}

impl StorageChangedEvent {
    pub fn new(units: Vec<ReportableUnit>) -> Self {
        Self {
            cmd: PROPERTY_CHANGED_CMD.to_string(),
            prop: STORAGE_PROP.to_string(),
            data: UnitsPayload { units },
        }
    }

    pub fn units(&self) -> &[ReportableUnit] {
        &self.data.units
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{UnitType, AVAILABLE_NOT_COMPUTED};

    fn usb_unit() -> StorageUnit {
        StorageUnit {
            id: 2064,
            name: "/dev/sdb".to_string(),
            unit_type: UnitType::UsbHost,
            is_removable: true,
            capacity: 2e9,
            available_capacity: AVAILABLE_NOT_COMPUTED,
            capability: 51,
        }
    }

    #[test]
    fn test_reportable_unit_json_shape() {
        let unit = ReportableUnit::from(&usb_unit());
        let json = serde_json::to_value(&unit).unwrap();

        assert_eq!(json["capacity"], 2e9);
        assert_eq!(json["availableCapacity"], -1.0);
        assert_eq!(json["type"], "USB_HOST");
        assert_eq!(json["isRemoveable"], true);
        assert_eq!(json["isRemovable"], true);
    }

    #[test]
    fn test_changed_event_json_shape() {
        let event = StorageChangedEvent::new(vec![ReportableUnit::from(&usb_unit())]);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["cmd"], "SystemInfoPropertyValueChanged");
        assert_eq!(json["prop"], "STORAGE");
        assert_eq!(json["data"]["units"].as_array().unwrap().len(), 1);
        assert_eq!(event.units()[0].unit_type, "USB_HOST");
    }
}
