//! Tests for the Mercury 200 driver over the mock serial port

use mercury_rs::mercury::frame::build_request;
use mercury_rs::{
    read_current_values, read_energy, CurrentValues, EnergyReading, Mercury200, MeterAddress,
    MeterCommand, MeterDriver, MockSerialPort,
};
use std::time::Duration;

const ADDR: u32 = 0x0A98_7654;
const CV_PAYLOAD: [u8; 7] = [0x23, 0x05, 0x01, 0x23, 0x00, 0x12, 0x34];
const E_PAYLOAD: [u8; 16] = [
    0x00, 0x12, 0x34, 0x56, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x99, 0x12, 0x34, 0x56, 0x78,
];

fn meter(mock: &MockSerialPort) -> Mercury200<MockSerialPort> {
    Mercury200::new(mock.clone(), Duration::from_millis(50))
}

#[tokio::test]
async fn test_read_current_values_round_trip() {
    let mock = MockSerialPort::new();
    mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
    let mut meter = meter(&mock);

    let values = read_current_values(&mut meter, MeterAddress(ADDR)).await.unwrap();
    assert_eq!(values.voltage, 2305);
    assert_eq!(mock.get_tx_data(), build_request(ADDR, 0x63).to_vec());
}

#[tokio::test]
async fn test_read_energy_round_trip() {
    let mock = MockSerialPort::new();
    mock.queue_response(ADDR, 0x27, &E_PAYLOAD);
    let mut meter = meter(&mock);

    let energy = read_energy(&mut meter, MeterAddress(ADDR)).await.unwrap();
    assert_eq!(energy.tariffs, [123_456, 10_000, 99, 12_345_678]);
}

#[tokio::test]
async fn test_crc_mismatch_yields_sentinel_and_resyncs() {
    let mock = MockSerialPort::new();
    mock.queue_corrupted_response(ADDR, 0x27, &E_PAYLOAD);
    mock.queue_response(ADDR, 0x27, &E_PAYLOAD);
    mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
    let mut meter = meter(&mock);

    assert_eq!(meter.read_energy().await, EnergyReading::INVALID);
    // The second energy frame was drained, the next read lines up again
    assert_eq!(mock.rx_pending(), 14);
    assert!(meter.read_current_values().await.is_valid());
}

#[tokio::test]
async fn test_misaligned_stream_recovers_next_cycle() {
    let mock = MockSerialPort::new();
    // Seven stray bytes ahead of two good frames
    mock.queue_rx_data(&[0x00; 7]);
    mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
    mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
    let mut meter = meter(&mock);

    assert_eq!(meter.read_current_values().await, CurrentValues::INVALID);
    // 7 stray bytes and half a frame fail the CRC, the resync read takes the next 14
    assert_eq!(mock.rx_pending(), 7);
}

#[tokio::test]
async fn test_timeout_does_not_resync() {
    let mock = MockSerialPort::new();
    mock.set_stalled(true);
    let mut meter = meter(&mock);

    assert_eq!(meter.read_current_values().await, CurrentValues::INVALID);
    mock.set_stalled(false);
    mock.queue_response(ADDR, 0x63, &CV_PAYLOAD);
    assert!(meter.read_current_values().await.is_valid());
}

#[tokio::test]
async fn test_request_error_propagates() {
    let mock = MockSerialPort::new();
    mock.set_next_error(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
    let mut meter = meter(&mock);

    assert!(read_current_values(&mut meter, MeterAddress(ADDR)).await.is_err());
    assert!(mock.tx_frames().is_empty());
}

#[test]
fn test_model_name() {
    let meter = Mercury200::new(MockSerialPort::new(), Duration::from_millis(10));
    assert_eq!(meter.model(), "Mercury 200");
}

#[tokio::test]
async fn test_driver_hands_back_its_port() {
    let mock = MockSerialPort::new();
    let mut meter = meter(&mock);
    meter
        .request_measure(MeterAddress(ADDR), MeterCommand::Energy)
        .await
        .unwrap();

    assert_eq!(meter.port().tx_frames(), vec![build_request(ADDR, 0x27).to_vec()]);
    let port = meter.into_inner();
    assert_eq!(port.get_tx_data(), build_request(ADDR, 0x27).to_vec());
}
