//! WiFi link: TCP client towards a fixed host

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::{fill_lines, write_fully, LineBuffer, Transport, TransportError};
use crate::config::{LinkConfig, WifiConfig};

pub struct WifiClient {
    target: String,
    connect_timeout: Duration,
    write_timeout: Duration,
    stream: Option<TcpStream>,
    lines: LineBuffer,
}

impl WifiClient {
    pub fn new(config: &WifiConfig, link: &LinkConfig) -> Self {
        let target = format!("{}:{}", config.host, config.port);
        log::info!("WiFi link will connect to {}", target);

        Self {
            target,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            stream: None,
            lines: LineBuffer::from_config(link),
        }
    }

    fn connect(&mut self) -> io::Result<TcpStream> {
        let addrs: Vec<SocketAddr> = self.target.to_socket_addrs()?.collect();
        let mut last_err = io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} did not resolve", self.target),
        );

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nonblocking(true)?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = e,
            }
        }

        Err(last_err)
    }

    fn disconnect(&mut self, reason: &str) {
        if self.stream.take().is_some() {
            log::info!("Disconnected from {} ({})", self.target, reason);
        }
        self.lines.clear();
    }
}

/// Non-blocking liveness probe; a zero-length peek means the peer hung up
fn peer_closed(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match stream.peek(&mut probe) {
        Ok(0) => true,
        Ok(_) => false,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => false,
        Err(_) => true,
    }
}

impl Transport for WifiClient {
    fn is_connected(&mut self) -> bool {
        if let Some(stream) = &self.stream {
            if peer_closed(stream) {
                self.disconnect("peer closed");
                return false;
            }
            return true;
        }

        match self.connect() {
            Ok(stream) => {
                log::info!("Connected to server {}", self.target);
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                log::debug!("Connection to {} failed: {}", self.target, e);
                false
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn read_line(&mut self) -> Option<String> {
        if let Some(stream) = self.stream.as_mut() {
            match fill_lines(stream, &mut self.lines) {
                Ok(false) => {}
                Ok(true) => self.disconnect("peer closed"),
                Err(e) => {
                    log::warn!("Read from {} failed: {}", self.target, e);
                    self.disconnect("read error");
                }
            }
        }
        self.lines.next_line()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        if let Err(e) = write_fully(stream, bytes, self.write_timeout) {
            self.disconnect("write error");
            return Err(e.into());
        }
        Ok(())
    }
}
