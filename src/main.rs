//! Blockwatch
//!
//! Reports the block storage units attached to this host, or watches for
//! hotplug changes and prints each change notification.
//!
//! ```text
//! blockwatch              # one-shot query, prints QueryResponse JSON
//! blockwatch --watch      # prints a StorageChangedEvent per change until Ctrl-C
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use blockwatch::adapters::{
    ChannelNotifier, LoggingNotifier, ProcMounts, ProcMountsConfig, SysfsConfig, SysfsSubsystem,
};
use blockwatch::error::{Error, Result};
use blockwatch::hardware::MountResolverConfig;
use blockwatch::{MonitorConfig, ServiceConfig, StorageService};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Blockwatch - block storage discovery and hotplug monitoring
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// sysfs mount point
    #[arg(long, env = "BLOCKWATCH_SYS_ROOT", default_value = "/sys")]
    sys_root: PathBuf,

    /// Device node directory
    #[arg(long, env = "BLOCKWATCH_DEV_ROOT", default_value = "/dev")]
    dev_root: PathBuf,

    /// Mount table file
    #[arg(long, env = "BLOCKWATCH_MOUNTS_PATH", default_value = "/proc/mounts")]
    mounts_path: PathBuf,

    /// Hotplug rescan interval in milliseconds
    #[arg(long, env = "BLOCKWATCH_POLL_INTERVAL_MS", default_value = "1000")]
    poll_interval_ms: u64,

    /// Mount table read timeout in seconds
    #[arg(long, env = "BLOCKWATCH_MOUNT_TIMEOUT_SECS", default_value = "5")]
    mount_timeout_secs: u64,

    /// Consecutive hotplug channel failures tolerated before giving up
    #[arg(long, env = "BLOCKWATCH_MAX_CHANNEL_ERRORS", default_value = "3")]
    max_channel_errors: u32,

    /// Watch for hotplug changes instead of querying once
    #[arg(long, env = "BLOCKWATCH_WATCH")]
    watch: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BLOCKWATCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "BLOCKWATCH_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn sysfs_config(&self) -> Result<SysfsConfig> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }
        Ok(SysfsConfig {
            sys_root: self.sys_root.clone(),
            dev_root: self.dev_root.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        })
    }

    fn service_config(&self) -> Result<ServiceConfig> {
        if self.mount_timeout_secs == 0 {
            return Err(Error::Config("mount timeout must be positive".to_string()));
        }
        Ok(ServiceConfig {
            monitor: MonitorConfig {
                max_channel_errors: self.max_channel_errors,
                ..Default::default()
            },
            mounts: MountResolverConfig {
                timeout: Duration::from_secs(self.mount_timeout_secs),
            },
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays machine-readable
    init_logging(&args);

    info!("Starting blockwatch");
    info!("  sysfs root: {}", args.sys_root.display());
    info!("  Mount table: {}", args.mounts_path.display());
    info!("  Watch mode: {}", args.watch);

    let config = args.service_config()?;
    let subsystem = Arc::new(SysfsSubsystem::new(args.sysfs_config()?));
    let mounts = Arc::new(ProcMounts::new(ProcMountsConfig {
        path: args.mounts_path.clone(),
    }));

    if args.watch {
        watch(&args, config, subsystem, mounts).await
    } else {
        query(&args, config, subsystem, mounts).await
    }
}

async fn query(
    args: &Args,
    config: ServiceConfig,
    subsystem: Arc<SysfsSubsystem>,
    mounts: Arc<ProcMounts>,
) -> Result<()> {
    let service = StorageService::new(subsystem, mounts, Arc::new(LoggingNotifier::new()), config);

    if let Err(e) = service.refresh().await {
        error!("Storage scan failed: {}", e);
    }

    print_json(&service.get(), args.pretty)
}

async fn watch(
    args: &Args,
    config: ServiceConfig,
    subsystem: Arc<SysfsSubsystem>,
    mounts: Arc<ProcMounts>,
) -> Result<()> {
    let (notifier, mut events) = ChannelNotifier::channel(64);
    let service = StorageService::new(subsystem, mounts, Arc::new(notifier), config);

    let started = service.start_listening().await;
    print_json(&service.get(), args.pretty)?;
    started?;
    info!("Watching for storage changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_json(&event, args.pretty)?,
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Received Ctrl-C");
                break;
            }
        }
    }

    service.stop_listening().await?;
    info!("Blockwatch shutdown complete");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
