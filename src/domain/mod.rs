//! Domain Layer
//!
//! Storage-unit value objects, the ports the monitor depends on, and the
//! events it emits.
//!
//! - **Ports** (`ports.rs`) - Value objects and trait abstractions for the OS
//! - **Events** (`events.rs`) - Query records and change notifications

pub mod events;
pub mod ports;

pub use events::{ReportableUnit, StorageChangedEvent, UnitsPayload};
pub use ports::{
    ChangeNotifier, DeviceId, DeviceSubsystem, FsStats, HotplugAction, HotplugEvent,
    HotplugStream, MountEntry, MountTable, RawDevice, StorageUnit, UnitType,
    AVAILABLE_NOT_COMPUTED,
};
