//! Error types for the block storage monitor

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while discovering and monitoring storage devices
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Device Subsystem Errors
    // =========================================================================
    /// The device subsystem or its hotplug channel could not be set up
    #[error("Storage monitor initialization failed: {0}")]
    Initialization(String),

    /// A hotplug event (or the device it refers to) could not be used
    #[error("Malformed device event: {0}")]
    MalformedEvent(String),

    /// The hotplug channel ended while the monitor was watching
    #[error("Hotplug event channel closed")]
    ChannelClosed,

    // =========================================================================
    // Capacity Resolution Errors
    // =========================================================================
    /// Mount table could not be read (or the read timed out)
    #[error("Read mount table failed: {0}")]
    MountTableUnavailable(String),

    // =========================================================================
    // Query Errors
    // =========================================================================
    /// Query against an empty registry
    #[error("Get storage failed: no storage devices found")]
    NoDevices,

    /// A rescan was requested while hotplug events own the registry
    #[error("Refresh unavailable: storage monitor is watching")]
    MonitorRunning,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the monitor loop should skip this error and keep watching.
    pub fn is_recoverable_event_error(&self) -> bool {
        matches!(self, Error::MalformedEvent(_))
    }
}
