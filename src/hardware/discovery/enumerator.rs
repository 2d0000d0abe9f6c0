//! Block Device Enumeration

use std::sync::Arc;

use tracing::debug;

use crate::domain::{DeviceSubsystem, RawDevice};
use crate::error::Result;

use super::BLOCK_SUBSYSTEM;

/// Lists candidate block devices from the device subsystem.
#[derive(Clone)]
pub struct DeviceEnumerator {
    subsystem: Arc<dyn DeviceSubsystem>,
}

impl DeviceEnumerator {
    pub fn new(subsystem: Arc<dyn DeviceSubsystem>) -> Self {
        Self { subsystem }
    }

    /// Enumerate every device in the "block" subsystem.
    ///
    /// The returned iterator is consumed once; enumerate again for a fresh
    /// view. Fails with [`Error::Initialization`](crate::Error::Initialization)
    /// if the subsystem cannot be opened.
    pub fn enumerate_block_devices(&self) -> Result<std::vec::IntoIter<RawDevice>> {
        let devices = self.subsystem.enumerate(BLOCK_SUBSYSTEM)?;
        debug!("Enumerated {} block devices", devices.len());
        Ok(devices.into_iter())
    }
}

impl std::fmt::Debug for DeviceEnumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceEnumerator").finish_non_exhaustive()
    }
}
