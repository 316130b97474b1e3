//! End-to-end tests of the application event loop

use mercury_rs::constants::{ATTRID_CUSTOM_MEASUREMENT_PERIOD, SAVE_ATTRS_DELAY};
use mercury_rs::{
    AppConfig, AppEvent, AttributeValue, ConfigStore, ManualScheduler, MemoryStore, Mercury200,
    MeterAddress, MeterApp, MockSerialPort, Poller, RecordingSink, TokioScheduler,
};
use std::time::Duration;

const CV_PAYLOAD: [u8; 7] = [0x23, 0x05, 0x01, 0x23, 0x00, 0x12, 0x34];
const E_PAYLOAD: [u8; 16] = [
    0x00, 0x12, 0x34, 0x56, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x99, 0x12, 0x34, 0x56, 0x78,
];

fn poller(mock: &MockSerialPort) -> Poller<Mercury200<MockSerialPort>> {
    Poller::new(
        Mercury200::new(mock.clone(), Duration::from_millis(20)),
        MeterAddress(0),
    )
}

fn stored(address: u32, period: u16) -> MemoryStore {
    MemoryStore::with_config(AppConfig {
        device_address: MeterAddress(address),
        measurement_period: period,
        ..AppConfig::default()
    })
}

#[tokio::test]
async fn test_events_drive_a_full_cycle() {
    let mock = MockSerialPort::new();
    mock.queue_response(1234, 0x63, &CV_PAYLOAD);
    mock.queue_response(1234, 0x27, &E_PAYLOAD);
    let mut app = MeterApp::new(
        poller(&mock),
        ManualScheduler::new(),
        RecordingSink::new(),
        stored(1234, 30),
    );
    app.init().unwrap();

    app.key_press().unwrap();
    assert!(app.scheduler().is_armed(AppEvent::ReadSensors));

    while app.scheduler().is_armed(AppEvent::ReadSensors) {
        app.handle_event(AppEvent::ReadSensors).await.unwrap();
    }

    assert_eq!(app.poller().current_values().voltage, 2305);
    assert_eq!(app.sink().reports.len(), 2);
    // The report timer keeps running across cycles
    assert!(app.scheduler().is_armed(AppEvent::Report));
}

#[tokio::test]
async fn test_period_write_saved_after_delay() {
    let mock = MockSerialPort::new();
    let mut app = MeterApp::new(
        poller(&mock),
        ManualScheduler::new(),
        RecordingSink::new(),
        stored(1, 30),
    );
    app.init().unwrap();

    app.write_attribute(ATTRID_CUSTOM_MEASUREMENT_PERIOD, AttributeValue::U16(15))
        .unwrap();
    assert_eq!(app.store().saves, 0);

    let delay = app.scheduler_mut().take_once(AppEvent::SaveAttributes);
    assert_eq!(delay, Some(SAVE_ATTRS_DELAY));
    app.handle_event(AppEvent::SaveAttributes).await.unwrap();

    assert_eq!(app.store().load().unwrap().unwrap().measurement_period, 15);
    assert_eq!(
        app.scheduler().repeating.get(&AppEvent::Report),
        Some(&Duration::from_secs(15))
    );
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_reports_periodically() {
    let mock = MockSerialPort::new();
    mock.queue_response(77, 0x63, &CV_PAYLOAD);
    mock.queue_response(77, 0x27, &E_PAYLOAD);
    let mut app = MeterApp::new(
        poller(&mock),
        TokioScheduler::new(),
        RecordingSink::new(),
        stored(77, 10),
    );
    app.init().unwrap();

    // Report at 10 s, then five phase ticks half a second apart
    let _ = tokio::time::timeout(Duration::from_secs(14), app.run()).await;

    assert_eq!(app.sink().reports.len(), 2);
    assert_eq!(app.poller().energy().tariffs[3], 12_345_678);
    assert!(!app.poller().is_active());
    assert!(!app.scheduler().is_armed(AppEvent::ReadSensors));
}
