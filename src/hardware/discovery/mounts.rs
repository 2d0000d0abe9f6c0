//! Mount-Based Capacity Resolution
//!
//! Internal disks are sized from the filesystem mounted at `/`, not from the
//! raw sector count.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::domain::{MountEntry, MountTable};
use crate::error::{Error, Result};

/// Root mount point the internal disk is sized from.
const ROOT_MOUNT_POINT: &str = "/";

/// Configuration for the mount resolver
#[derive(Debug, Clone)]
pub struct MountResolverConfig {
    /// Upper bound on one mount-table read plus statfs
    pub timeout: Duration,
}

impl Default for MountResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Resolved capacity figures in bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capacity {
    pub total: f64,
    pub available: f64,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity {
        total: 0.0,
        available: 0.0,
    };
}

/// Resolve the capacity of the internal disk from the mount table.
///
/// Every entry whose source is an absolute path and whose mount point is
/// exactly `/` qualifies; the last one in table order wins. Returns zero
/// capacity when nothing qualifies.
pub fn resolve_internal_capacity(table: &dyn MountTable) -> Result<Capacity> {
    let entries = table.entries()?;

    let Some(root) = find_root_entry(&entries) else {
        debug!("No root filesystem entry in mount table");
        return Ok(Capacity::ZERO);
    };

    let stats = table.stats(Path::new(&root.mount_point))?;
    let block_size = stats.block_size as f64;

    debug!(
        source = %root.source,
        fs_type = %root.fs_type,
        "Resolved root filesystem for internal disk"
    );

    Ok(Capacity {
        total: block_size * stats.total_blocks as f64,
        available: block_size * stats.available_blocks as f64,
    })
}

/// The mount entry the internal disk is sized from, if any.
pub fn find_root_entry(entries: &[MountEntry]) -> Option<&MountEntry> {
    entries
        .iter()
        .rev()
        .find(|entry| entry.source.starts_with('/') && entry.mount_point == ROOT_MOUNT_POINT)
}

/// Resolves internal-disk capacity off the async executor, with a deadline.
#[derive(Clone)]
pub struct MountResolver {
    table: Arc<dyn MountTable>,
    config: MountResolverConfig,
}

impl MountResolver {
    pub fn new(table: Arc<dyn MountTable>, config: MountResolverConfig) -> Self {
        Self { table, config }
    }

    /// Resolve internal-disk capacity, failing with
    /// [`Error::MountTableUnavailable`] if the read exceeds the timeout.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Result<Capacity> {
        let table = Arc::clone(&self.table);
        let read = tokio::task::spawn_blocking(move || resolve_internal_capacity(table.as_ref()));

        match tokio::time::timeout(self.config.timeout, read).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::Internal(format!(
                "Mount table reader panicked: {}",
                join_err
            ))),
            Err(_) => {
                warn!(
                    "Mount table read exceeded {:?}, giving up",
                    self.config.timeout
                );
                Err(Error::MountTableUnavailable(format!(
                    "timed out after {:?}",
                    self.config.timeout
                )))
            }
        }
    }
}

impl std::fmt::Debug for MountResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountResolver")
            .field("config", &self.config)
            .finish()
    }
}
