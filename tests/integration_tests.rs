//! Integration tests for the storage service
//!
//! Drives the service through the in-memory device subsystem and mount
//! table, end to end from hotplug event to change notification.

use std::sync::Arc;
use std::time::Duration;

use blockwatch::adapters::{InMemoryDeviceSubsystem, InMemoryNotifier, StaticMountTable};
use blockwatch::domain::{FsStats, MountEntry, RawDevice};
use blockwatch::{Error, MonitorConfig, MonitorState, ServiceConfig, StorageService};

const WAIT: Duration = Duration::from_secs(2);

// =============================================================================
// Helper Functions
// =============================================================================

fn internal_disk(devnum: u64) -> RawDevice {
    RawDevice {
        devnum,
        sysname: "sda".to_string(),
        devnode: Some("/dev/sda".to_string()),
        removable: Some("0".to_string()),
        capability: Some("50".to_string()),
        size: Some("1953525168".to_string()),
    }
}

fn usb_stick(devnum: u64) -> RawDevice {
    RawDevice {
        devnum,
        sysname: "sdb".to_string(),
        devnode: Some("/dev/sdb".to_string()),
        removable: Some("1".to_string()),
        capability: Some("51".to_string()),
        // 2e9 bytes
        size: Some("3906250".to_string()),
    }
}

fn root_mounts() -> StaticMountTable {
    StaticMountTable::new(vec![MountEntry::new("/dev/sda2", "/", "ext4")]).with_stats(
        "/",
        FsStats {
            block_size: 1000,
            total_blocks: 1_000_000,
            available_blocks: 500_000,
        },
    )
}

struct Harness {
    subsystem: Arc<InMemoryDeviceSubsystem>,
    notifier: Arc<InMemoryNotifier>,
    service: StorageService,
}

fn harness(devices: Vec<RawDevice>, mounts: StaticMountTable, config: ServiceConfig) -> Harness {
    let subsystem = Arc::new(InMemoryDeviceSubsystem::new(devices));
    let notifier = Arc::new(InMemoryNotifier::new());
    let service = StorageService::new(
        subsystem.clone(),
        Arc::new(mounts),
        notifier.clone(),
        config,
    );
    Harness {
        subsystem,
        notifier,
        service,
    }
}

async fn wait_for_state(service: &StorageService, state: MonitorState) {
    let wait = async {
        while service.status().state != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, wait)
        .await
        .expect("monitor did not reach expected state");
}

// =============================================================================
// Query Tests
// =============================================================================

#[tokio::test]
async fn test_query_reports_internal_and_usb_units() {
    let h = harness(
        vec![internal_disk(1), usb_stick(2)],
        root_mounts(),
        ServiceConfig::default(),
    );
    assert_eq!(h.service.refresh().await.unwrap(), 2);

    let response = h.service.get();
    assert_eq!(response.error_message, "");
    assert_eq!(response.units.len(), 2);

    let internal = &response.units[0];
    assert_eq!(internal.unit_type, "INTERNAL");
    assert_eq!(internal.capacity, 1e9);
    assert_eq!(internal.available_capacity, 5e8);
    assert!(!internal.is_removable);

    let usb = &response.units[1];
    assert_eq!(usb.unit_type, "USB_HOST");
    assert_eq!(usb.capacity, 2e9);
    assert_eq!(usb.available_capacity, -1.0);
    assert!(usb.is_removable);

    for unit in &response.units {
        assert_eq!(unit.is_removeable, unit.is_removable);
    }

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["units"][1]["type"], "USB_HOST");
    assert_eq!(json["units"][1]["availableCapacity"], -1.0);
    assert_eq!(json["units"][1]["isRemoveable"], true);
}

#[tokio::test]
async fn test_query_on_empty_registry_fails() {
    let h = harness(vec![], root_mounts(), ServiceConfig::default());

    let response = h.service.get();
    assert!(!response.error_message.is_empty());
    assert!(response.units.is_empty());
}

#[tokio::test]
async fn test_query_hides_zero_capacity_units() {
    let mut empty_reader = usb_stick(2064);
    empty_reader.size = Some("0".to_string());

    let h = harness(
        vec![internal_disk(2048), empty_reader],
        root_mounts(),
        ServiceConfig::default(),
    );
    assert_eq!(h.service.refresh().await.unwrap(), 2);

    let response = h.service.get();
    assert_eq!(response.units.len(), 1);
    assert_eq!(response.units[0].unit_type, "INTERNAL");
}

// =============================================================================
// Hotplug Tests
// =============================================================================

#[tokio::test]
async fn test_hotplug_add_and_remove_notify() {
    let h = harness(vec![internal_disk(1)], root_mounts(), ServiceConfig::default());
    h.service.start_listening().await.unwrap();
    assert_eq!(h.service.get().units.len(), 1);

    let sender = h.subsystem.event_sender();

    sender.send_add(usb_stick(2)).unwrap();
    assert!(h.notifier.wait_for(1, WAIT).await);
    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].cmd, "SystemInfoPropertyValueChanged");
    assert_eq!(events[0].prop, "STORAGE");
    assert_eq!(events[0].units().len(), 2);

    sender.send_remove(internal_disk(1)).unwrap();
    assert!(h.notifier.wait_for(2, WAIT).await);
    let events = h.notifier.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].units().len(), 1);
    assert_eq!(events[1].units()[0].unit_type, "USB_HOST");

    h.service.stop_listening().await.unwrap();
}

#[tokio::test]
async fn test_readding_known_device_does_not_notify() {
    let h = harness(vec![internal_disk(1)], root_mounts(), ServiceConfig::default());
    h.service.start_listening().await.unwrap();

    let sender = h.subsystem.event_sender();
    sender.send_add(internal_disk(1)).unwrap();
    // A counted change afterwards; events are applied in order
    sender.send_add(usb_stick(2)).unwrap();

    assert!(h.notifier.wait_for(1, WAIT).await);
    let events = h.notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].units().len(), 2);
    assert_eq!(h.service.status().events_processed, 2);

    h.service.stop_listening().await.unwrap();
}

#[tokio::test]
async fn test_removing_last_unit_notifies_empty_list() {
    let h = harness(vec![usb_stick(2)], root_mounts(), ServiceConfig::default());
    h.service.start_listening().await.unwrap();

    h.subsystem.event_sender().send_remove(usb_stick(2)).unwrap();
    assert!(h.notifier.wait_for(1, WAIT).await);
    assert!(h.notifier.events()[0].units().is_empty());
    assert!(!h.service.get().error_message.is_empty());

    h.service.stop_listening().await.unwrap();
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_start_fails_without_device_subsystem() {
    let subsystem = Arc::new(InMemoryDeviceSubsystem::unavailable());
    let service = StorageService::new(
        subsystem,
        Arc::new(root_mounts()),
        Arc::new(InMemoryNotifier::new()),
        ServiceConfig::default(),
    );

    let result = service.start_listening().await;
    assert!(matches!(result, Err(Error::Initialization(_))));
    assert_eq!(service.status().state, MonitorState::Stopped);
    assert!(service.status().last_error.is_some());
}

#[tokio::test]
async fn test_start_fails_when_mount_table_unavailable() {
    let h = harness(
        vec![internal_disk(1)],
        StaticMountTable::unavailable(),
        ServiceConfig::default(),
    );

    let result = h.service.start_listening().await;
    assert!(matches!(result, Err(Error::MountTableUnavailable(_))));
    assert_eq!(h.service.status().state, MonitorState::Stopped);
}

#[tokio::test]
async fn test_failed_start_is_reported_by_query() {
    let h = harness(
        vec![internal_disk(1)],
        StaticMountTable::unavailable(),
        ServiceConfig::default(),
    );

    let error = h.service.start_listening().await.unwrap_err();
    let response = h.service.get();
    assert_eq!(response.error_message, error.to_string());
    assert!(response.error_message.starts_with("Read mount table failed"));
    assert!(response.units.is_empty());
}

#[tokio::test]
async fn test_refresh_while_listening_keeps_notifications() {
    let h = harness(vec![internal_disk(1)], root_mounts(), ServiceConfig::default());
    h.service.start_listening().await.unwrap();

    h.subsystem.set_devices(vec![internal_disk(1), usb_stick(2)]);
    assert!(matches!(h.service.refresh().await, Err(Error::MonitorRunning)));
    assert_eq!(h.service.registry().len(), 1);

    h.subsystem.event_sender().send_add(usb_stick(2)).unwrap();
    assert!(h.notifier.wait_for(1, WAIT).await);
    assert_eq!(h.notifier.events()[0].units().len(), 2);

    h.service.stop_listening().await.unwrap();
}

#[tokio::test]
async fn test_stop_ends_watching_promptly() {
    let h = harness(vec![internal_disk(1)], root_mounts(), ServiceConfig::default());
    h.service.start_listening().await.unwrap();
    assert_eq!(h.service.status().state, MonitorState::Watching);

    tokio::time::timeout(WAIT, h.service.stop_listening())
        .await
        .expect("stop did not complete")
        .unwrap();
    assert_eq!(h.service.status().state, MonitorState::Stopped);

    // Events after stop are not applied
    h.subsystem.event_sender().send_add(usb_stick(2)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.notifier.is_empty());
    assert_eq!(h.service.get().units.len(), 1);
}

#[tokio::test]
async fn test_channel_failure_is_surfaced() {
    let config = ServiceConfig {
        monitor: MonitorConfig {
            channel_retry_delay: Duration::from_millis(1),
            max_channel_errors: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = harness(vec![internal_disk(1)], root_mounts(), config);
    h.service.start_listening().await.unwrap();

    h.subsystem
        .event_sender()
        .send_error(Error::Internal("receive buffer overrun".to_string()))
        .unwrap();

    wait_for_state(&h.service, MonitorState::Stopped).await;
    let status = h.service.status();
    assert_eq!(status.channel_errors, 1);
    assert!(status.last_error.unwrap().contains("receive buffer overrun"));

    // Queries keep answering from the last snapshot
    assert_eq!(h.service.get().units.len(), 1);
    assert!(matches!(
        h.service.stop_listening().await,
        Err(Error::Internal(_))
    ));
}

#[tokio::test]
async fn test_malformed_event_does_not_stop_monitor() {
    let h = harness(vec![internal_disk(1)], root_mounts(), ServiceConfig::default());
    h.service.start_listening().await.unwrap();

    let sender = h.subsystem.event_sender();
    sender
        .send_error(Error::MalformedEvent("event without devnum".to_string()))
        .unwrap();
    sender.send_add(usb_stick(2)).unwrap();

    assert!(h.notifier.wait_for(1, WAIT).await);
    let status = h.service.status();
    assert_eq!(status.state, MonitorState::Watching);
    assert_eq!(status.malformed_events, 1);

    h.service.stop_listening().await.unwrap();
}
