//! Byte-stream transports shared by frames and commands

mod bluetooth;
mod wifi;

pub use bluetooth::BluetoothSerial;
pub use wifi::WifiClient;

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::LinkConfig;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("not connected")]
    NotConnected,
}

/// An already-established link to the host
///
/// All calls return promptly. `read_line` hands back at most one buffered
/// line; `write_bytes` either writes the whole buffer or fails, in which case
/// the backend drops the connection so a torn message is never continued.
pub trait Transport {
    /// Checks the peer and (re)establishes the link when the backend can
    fn is_connected(&mut self) -> bool;

    /// Whether the link found by the last `is_connected` is still up
    ///
    /// Never probes or reconnects; a hangup noticed by `read_line` or
    /// `write_bytes` shows up here.
    fn is_open(&self) -> bool;

    fn read_line(&mut self) -> Option<String>;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read_line(&mut self) -> Option<String> {
        (**self).read_line()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_bytes(bytes)
    }
}

/// Splits inbound bytes into trimmed text lines
///
/// Lines are terminated by `\n`; a preceding `\r` goes away with the trim.
/// Invalid UTF-8 is replaced rather than rejected. A line growing past
/// `max_len` without a terminator is dropped up to the next `\n`. At most
/// `max_queued` complete lines are held; a burst beyond that drops the
/// oldest ones so the newest command is the one that survives.
#[derive(Debug)]
pub struct LineBuffer {
    partial: Vec<u8>,
    lines: VecDeque<String>,
    max_len: usize,
    max_queued: usize,
    discarding: bool,
    dropped: u64,
}

impl LineBuffer {
    pub fn new(max_len: usize, max_queued: usize) -> Self {
        let max_queued = max_queued.max(1);
        Self {
            partial: Vec::with_capacity(max_len.min(1024)),
            lines: VecDeque::with_capacity(max_queued),
            max_len,
            max_queued,
            discarding: false,
            dropped: 0,
        }
    }

    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(config.max_line_len, config.max_queued_lines)
    }

    pub fn push(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if b == b'\n' {
                if !self.discarding {
                    let line = String::from_utf8_lossy(&self.partial).trim().to_string();
                    if !line.is_empty() {
                        self.enqueue(line);
                    }
                }
                self.partial.clear();
                self.discarding = false;
                continue;
            }

            if self.discarding {
                continue;
            }

            self.partial.push(b);
            if self.partial.len() > self.max_len {
                log::warn!("Inbound line exceeds {} bytes, dropping it", self.max_len);
                self.partial.clear();
                self.discarding = true;
            }
        }
    }

    fn enqueue(&mut self, line: String) {
        if self.lines.len() == self.max_queued {
            self.lines.pop_front();
            self.dropped += 1;
            log::warn!(
                "Inbound line queue full ({} lines), dropped the oldest ({} so far)",
                self.max_queued,
                self.dropped
            );
        }
        self.lines.push_back(line);
    }

    /// Complete lines waiting for `next_line`
    pub fn queued(&self) -> usize {
        self.lines.len()
    }

    /// Lines discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn clear(&mut self) {
        self.partial.clear();
        self.lines.clear();
        self.discarding = false;
    }
}

const READ_CHUNK: usize = 512;
const WRITE_RETRY: Duration = Duration::from_millis(2);

/// Non-blocking sockets report `WouldBlock`; serial ports time out their poll
fn is_not_ready(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Drains whatever a non-blocking reader has buffered into `lines`
///
/// Returns `Ok(true)` once the peer has closed the stream.
pub(crate) fn fill_lines<R: Read>(reader: &mut R, lines: &mut LineBuffer) -> io::Result<bool> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return Ok(true),
            Ok(n) => lines.push(&chunk[..n]),
            Err(e) if is_not_ready(&e) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Writes the whole buffer to a non-blocking writer within `timeout`
pub(crate) fn write_fully<W: Write>(writer: &mut W, mut bytes: &[u8], timeout: Duration) -> io::Result<()> {
    let deadline = Instant::now() + timeout;
    while !bytes.is_empty() {
        match writer.write(bytes) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if is_not_ready(&e) => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{} bytes left unwritten", bytes.len()),
                    ));
                }
                thread::sleep(WRITE_RETRY);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that yields scripted chunks, then WouldBlock
    struct Scripted {
        chunks: VecDeque<io::Result<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    /// Writer accepting at most `per_call` bytes, blocking every other call
    struct Choppy {
        written: Vec<u8>,
        per_call: usize,
        block_next: bool,
    }

    impl Write for Choppy {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.block_next = !self.block_next;
            if !self.block_next {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.per_call);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Stalled;

    impl Write for Stalled {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_line_buffer_splits_and_trims() {
        let mut lines = LineBuffer::new(64, 16);
        lines.push(b"CMD:1,2\r\n  noise  \nCMD:3");
        assert_eq!(lines.next_line().as_deref(), Some("CMD:1,2"));
        assert_eq!(lines.next_line().as_deref(), Some("noise"));
        assert_eq!(lines.next_line(), None);

        lines.push(b",4\n");
        assert_eq!(lines.next_line().as_deref(), Some("CMD:3,4"));
    }

    #[test]
    fn test_line_buffer_skips_blank_lines() {
        let mut lines = LineBuffer::new(64, 16);
        lines.push(b"\n\r\n   \nCMD:5,6\n");
        assert_eq!(lines.next_line().as_deref(), Some("CMD:5,6"));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_line_buffer_drops_overlong_line() {
        let mut lines = LineBuffer::new(8, 16);
        lines.push(b"0123456789abcdef");
        lines.push(b"still the same line\nCMD:7,8\n");
        assert_eq!(lines.next_line().as_deref(), Some("CMD:7,8"));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_line_buffer_lossy_utf8() {
        let mut lines = LineBuffer::new(64, 16);
        lines.push(b"CMD:\xff9,1\n");
        assert_eq!(lines.next_line().as_deref(), Some("CMD:\u{fffd}9,1"));
    }

    #[test]
    fn test_fill_lines_stops_on_would_block() {
        let mut reader = Scripted {
            chunks: VecDeque::from(vec![Ok(b"CMD:1".to_vec()), Ok(b",2\n".to_vec())]),
        };
        let mut lines = LineBuffer::new(64, 16);

        let closed = fill_lines(&mut reader, &mut lines).unwrap();

        assert!(!closed);
        assert_eq!(lines.next_line().as_deref(), Some("CMD:1,2"));
    }

    #[test]
    fn test_line_buffer_keeps_newest_lines_of_a_burst() {
        let mut lines = LineBuffer::new(64, 4);
        for i in 0..200_000u32 {
            lines.push(format!("CMD:{},20\n", i % 181).as_bytes());
        }

        assert_eq!(lines.queued(), 4);
        assert_eq!(lines.dropped(), 200_000 - 4);
        // 199_999 % 181 == 175
        assert_eq!(lines.next_line().as_deref(), Some("CMD:172,20"));
        assert_eq!(lines.next_line().as_deref(), Some("CMD:173,20"));
        assert_eq!(lines.next_line().as_deref(), Some("CMD:174,20"));
        assert_eq!(lines.next_line().as_deref(), Some("CMD:175,20"));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_fill_lines_bounds_a_flooding_reader() {
        let chunks = (0..1000)
            .map(|_| Ok(b"CMD:10,20\nCMD:11,21\n".to_vec()))
            .collect();
        let mut reader = Scripted { chunks };
        let mut lines = LineBuffer::new(64, 3);

        assert!(!fill_lines(&mut reader, &mut lines).unwrap());
        assert_eq!(lines.queued(), 3);
        assert_eq!(lines.next_line().as_deref(), Some("CMD:11,21"));
    }

    #[test]
    fn test_fill_lines_treats_timeout_as_no_data() {
        let mut reader = Scripted {
            chunks: VecDeque::from(vec![Ok(b"CMD:1,2\n".to_vec()), Err(io::ErrorKind::TimedOut.into())]),
        };
        let mut lines = LineBuffer::new(64, 16);

        assert!(!fill_lines(&mut reader, &mut lines).unwrap());
        assert_eq!(lines.next_line().as_deref(), Some("CMD:1,2"));
    }

    #[test]
    fn test_fill_lines_reports_eof() {
        let mut reader = Scripted {
            chunks: VecDeque::from(vec![Ok(b"bye\n".to_vec()), Ok(Vec::new())]),
        };
        let mut lines = LineBuffer::new(64, 16);

        assert!(fill_lines(&mut reader, &mut lines).unwrap());
        assert_eq!(lines.next_line().as_deref(), Some("bye"));
    }

    #[test]
    fn test_fill_lines_propagates_errors() {
        let mut reader = Scripted {
            chunks: VecDeque::from(vec![Err(io::ErrorKind::BrokenPipe.into())]),
        };
        let mut lines = LineBuffer::new(64, 16);

        assert!(fill_lines(&mut reader, &mut lines).is_err());
    }

    #[test]
    fn test_write_fully_retries_partial_writes() {
        let mut writer = Choppy {
            written: Vec::new(),
            per_call: 3,
            block_next: false,
        };
        let payload: Vec<u8> = (0..20).collect();

        write_fully(&mut writer, &payload, Duration::from_secs(1)).unwrap();

        assert_eq!(writer.written, payload);
    }

    #[test]
    fn test_write_fully_times_out() {
        let err = write_fully(&mut Stalled, b"abc", Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
