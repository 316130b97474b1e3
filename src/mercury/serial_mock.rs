//! Mock serial port implementation for testing
//!
//! Simulates the meter end of the link: requests written by the driver are
//! captured, and responses queued beforehand are handed out on read.

use crate::mercury::frame::build_response;
use crate::mercury::serial::SerialPort;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Mock serial port that simulates bidirectional communication
#[derive(Clone, Default)]
pub struct MockSerialPort {
    /// Every write issued to the port, one entry per write
    pub tx_frames: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Data to be read from the port (incoming)
    pub rx_buffer: Arc<Mutex<VecDeque<u8>>>,
    /// Simulated error for the next operation
    pub next_error: Arc<Mutex<Option<io::Error>>>,
    /// When set, reads never complete (a silent meter)
    pub stalled: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockSerialPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue data to be read from the port
    pub fn queue_rx_data(&self, data: &[u8]) {
        lock(&self.rx_buffer).extend(data);
    }

    /// Queue a well-formed meter response
    pub fn queue_response(&self, address: u32, command: u8, payload: &[u8]) {
        self.queue_rx_data(&build_response(address, command, payload));
    }

    /// Queue a meter response whose CRC does not match
    pub fn queue_corrupted_response(&self, address: u32, command: u8, payload: &[u8]) {
        let mut frame = build_response(address, command, payload);
        if let Some(last) = frame.last_mut() {
            *last ^= 0xFF;
        }
        self.queue_rx_data(&frame);
    }

    /// All data written to the port, concatenated
    pub fn get_tx_data(&self) -> Vec<u8> {
        lock(&self.tx_frames).concat()
    }

    /// Individual writes in order
    pub fn tx_frames(&self) -> Vec<Vec<u8>> {
        lock(&self.tx_frames).clone()
    }

    /// Bytes queued but not yet read
    pub fn rx_pending(&self) -> usize {
        lock(&self.rx_buffer).len()
    }

    /// Clear all buffers
    pub fn clear(&self) {
        lock(&self.tx_frames).clear();
        lock(&self.rx_buffer).clear();
    }

    /// Set an error to be returned on the next operation
    pub fn set_next_error(&self, error: io::Error) {
        *lock(&self.next_error) = Some(error);
    }

    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }
}

impl AsyncRead for MockSerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        if self.stalled.load(Ordering::SeqCst) {
            // Woken by the caller's timeout, never by data
            return Poll::Pending;
        }

        let mut rx = lock(&self.rx_buffer);
        let available = rx.len().min(buf.remaining());
        if available > 0 {
            let data: Vec<u8> = rx.drain(..available).collect();
            buf.put_slice(&data);
        }

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockSerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Some(error) = lock(&self.next_error).take() {
            return Poll::Ready(Err(error));
        }

        lock(&self.tx_frames).push(buf.to_vec());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait::async_trait]
impl SerialPort for MockSerialPort {
    async fn flush(&mut self) -> Result<(), std::io::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mercury::frame::verify_crc;

    #[test]
    fn test_mock_serial_port_creation() {
        let port = MockSerialPort::new();
        assert!(port.get_tx_data().is_empty());
        assert_eq!(port.rx_pending(), 0);
    }

    #[test]
    fn test_queue_response_is_well_formed() {
        let port = MockSerialPort::new();
        port.queue_response(0x0A98_7654, 0x63, &[0x23, 0x05, 0x01, 0x23, 0x00, 0x12, 0x34]);

        let rx: Vec<u8> = port.rx_buffer.lock().unwrap().iter().copied().collect();
        assert_eq!(rx.len(), 14);
        assert_eq!(&rx[..5], &[0x0A, 0x98, 0x76, 0x54, 0x63]);
        assert!(verify_crc(&rx).is_ok());
    }

    #[test]
    fn test_queue_corrupted_response() {
        let port = MockSerialPort::new();
        port.queue_corrupted_response(1, 0x27, &[0u8; 16]);

        let rx: Vec<u8> = port.rx_buffer.lock().unwrap().iter().copied().collect();
        assert_eq!(rx.len(), 23);
        assert!(verify_crc(&rx).is_err());
    }

    #[test]
    fn test_clear_buffers() {
        let port = MockSerialPort::new();
        port.queue_rx_data(&[1, 2, 3]);
        port.clear();
        assert_eq!(port.rx_pending(), 0);
    }
}
