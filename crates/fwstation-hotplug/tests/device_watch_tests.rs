//! Device watcher against a fake sysfs tree

#![cfg(unix)]

use fwstation_hotplug::prelude::*;
use fwstation_test_helpers::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

async fn next_event(receiver: &mut mpsc::Receiver<DeviceEvent>) -> DeviceEvent {
    must_some(
        must(timeout(Duration::from_secs(5), receiver.recv()).await),
        "device event",
    )
}

#[tokio::test]
async fn announces_arrival_and_departure() -> TestResult {
    let fixture = SysfsFixture::new()?;
    fixture.add_usb_device("1-1", "1d6b", "0002")?;
    let bus = Arc::new(SysfsBus::new(fixture.sysfs_root(), fixture.dev_root()));
    let (sender, mut receiver) = mpsc::channel(8);
    let handle = DeviceWatcher::spawn(bus, Duration::from_millis(20), sender)?;

    fixture.add_usb_device("1-2", "2341", "0043")?;
    let DeviceEvent::Connected(device) = next_event(&mut receiver).await else {
        panic!("expected a connect event");
    };
    assert_eq!(device.system_name, "1-2");
    assert_eq!(device.id_pair(), "2341:0043");
    assert_eq!(device.comm_port, None);

    fixture.remove_usb_device("1-2")?;
    let DeviceEvent::Disconnected(device) = next_event(&mut receiver).await else {
        panic!("expected a disconnect event");
    };
    assert_eq!(device.system_name, "1-2");

    assert!(receiver.try_recv().is_err(), "baseline devices are not announced");
    handle.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stop_ends_the_loop() -> TestResult {
    let fixture = SysfsFixture::new()?;
    let bus = Arc::new(SysfsBus::new(fixture.sysfs_root(), fixture.dev_root()));
    let (sender, _receiver) = mpsc::channel(8);
    let handle = DeviceWatcher::spawn(bus, Duration::from_millis(10), sender)?;
    assert!(handle.is_running());

    handle.stop();
    assert!(!handle.is_running());
    handle.shutdown().await;
    Ok(())
}
