//! Bluetooth serial over an RFCOMM tty
//!
//! `rfcomm watch` creates the tty node when a host connects to the serial
//! port profile and removes it on hangup, so the node's presence is the
//! connection signal.

use std::path::Path;
use std::time::Duration;

use serialport::TTYPort;

use super::{fill_lines, write_fully, LineBuffer, Transport, TransportError};
use crate::config::{BluetoothConfig, LinkConfig};

/// RFCOMM ignores the line rate, but the port builder wants one
const BAUD_RATE: u32 = 115_200;

/// Per-call poll timeout; reads and writes give up with `TimedOut` past it
const POLL_TIMEOUT: Duration = Duration::from_millis(5);

pub struct BluetoothSerial {
    path: String,
    port: Option<TTYPort>,
    lines: LineBuffer,
    write_timeout: Duration,
}

impl BluetoothSerial {
    pub fn new(config: &BluetoothConfig, link: &LinkConfig) -> Self {
        log::info!(
            "Bluetooth serial on {} (advertised as {})",
            config.rfcomm_path,
            config.device_name
        );

        Self {
            path: config.rfcomm_path.clone(),
            port: None,
            lines: LineBuffer::from_config(link),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        }
    }

    fn disconnect(&mut self, reason: &str) {
        if self.port.take().is_some() {
            log::info!("Bluetooth client disconnected ({})", reason);
        }
        self.lines.clear();
    }
}

/// Opens the tty in raw mode so frames pass through untouched
fn open_port(path: &str) -> serialport::Result<TTYPort> {
    serialport::new(path, BAUD_RATE).timeout(POLL_TIMEOUT).open_native()
}

impl Transport for BluetoothSerial {
    fn is_connected(&mut self) -> bool {
        if !Path::new(&self.path).exists() {
            self.disconnect("tty removed");
            return false;
        }

        if self.port.is_none() {
            match open_port(&self.path) {
                Ok(port) => {
                    log::info!("Bluetooth client connected on {}", self.path);
                    self.port = Some(port);
                }
                Err(e) => {
                    log::debug!("Cannot open {}: {}", self.path, e);
                    return false;
                }
            }
        }

        true
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn read_line(&mut self) -> Option<String> {
        if let Some(port) = self.port.as_mut() {
            match fill_lines(port, &mut self.lines) {
                Ok(false) => {}
                Ok(true) => self.disconnect("hangup"),
                Err(e) => {
                    log::warn!("Bluetooth read failed: {}", e);
                    self.disconnect("read error");
                }
            }
        }
        self.lines.next_line()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(e) = write_fully(port, bytes, self.write_timeout) {
            self.disconnect("write error");
            return Err(e.into());
        }
        Ok(())
    }
}
