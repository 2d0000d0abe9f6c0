//! Storage Service
//!
//! The object callers hold: wires the registry and monitor together and
//! answers storage queries.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

use crate::domain::{ChangeNotifier, DeviceSubsystem, MountTable, ReportableUnit};
use crate::error::{Error, Result};
use crate::hardware::{MountResolverConfig, StorageScanner};
use crate::monitor::{MonitorConfig, MonitorStatus, StorageMonitor};
use crate::registry::StorageRegistry;

/// Configuration for the storage service
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub monitor: MonitorConfig,
    pub mounts: MountResolverConfig,
}

/// Response to a storage query.
///
/// An empty `error_message` means success; on failure `units` is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub error_message: String,
    pub units: Vec<ReportableUnit>,
}

impl QueryResponse {
    pub fn success(units: Vec<ReportableUnit>) -> Self {
        Self {
            error_message: String::new(),
            units,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            error_message: error.to_string(),
            units: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_empty()
    }
}

/// Storage information service.
///
/// Construct once and share by `Arc`; queries may run concurrently with
/// the monitor.
#[derive(Debug)]
pub struct StorageService {
    registry: Arc<StorageRegistry>,
    monitor: StorageMonitor,
    /// Failure of the last scan or start attempt, until one succeeds
    setup_error: RwLock<Option<String>>,
}

impl StorageService {
    pub fn new(
        subsystem: Arc<dyn DeviceSubsystem>,
        mounts: Arc<dyn MountTable>,
        notifier: Arc<dyn ChangeNotifier>,
        config: ServiceConfig,
    ) -> Self {
        let scanner = StorageScanner::from_ports(subsystem.clone(), mounts, config.mounts);
        let registry = Arc::new(StorageRegistry::new());
        let monitor = StorageMonitor::new(
            config.monitor,
            subsystem,
            scanner,
            Arc::clone(&registry),
            notifier,
        );

        Self {
            registry,
            monitor,
            setup_error: RwLock::new(None),
        }
    }

    /// Read access to the registry backing queries.
    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Report the storage units currently known.
    ///
    /// While nothing has been registered, a failed scan or start is reported
    /// in place of the generic no-devices error.
    pub fn get(&self) -> QueryResponse {
        if self.registry.is_empty() {
            if let Some(message) = self.setup_error.read().clone() {
                warn!("Storage query failed: {}", message);
                return QueryResponse {
                    error_message: message,
                    units: Vec::new(),
                };
            }
        }

        match self.registry.list_reportable_units() {
            Ok(units) => QueryResponse::success(units),
            Err(e) => {
                warn!("Storage query failed: {}", e);
                QueryResponse::failure(&e)
            }
        }
    }

    /// Rescan the host and replace the registry contents.
    ///
    /// Fails with [`Error::MonitorRunning`] while listening. Returns the
    /// number of units found.
    pub async fn refresh(&self) -> Result<usize> {
        match self.monitor.rescan().await {
            Err(Error::MonitorRunning) => Err(Error::MonitorRunning),
            result => self.track_setup(result),
        }
    }

    /// Start delivering change notifications.
    pub async fn start_listening(&self) -> Result<()> {
        let result = self.monitor.start().await;
        self.track_setup(result)
    }

    /// Stop delivering change notifications.
    pub async fn stop_listening(&self) -> Result<()> {
        self.monitor.stop().await
    }

    /// Monitor state and counters.
    pub fn status(&self) -> MonitorStatus {
        self.monitor.status()
    }

    fn track_setup<T>(&self, result: Result<T>) -> Result<T> {
        *self.setup_error.write() = result.as_ref().err().map(ToString::to_string);
        result
    }
}
