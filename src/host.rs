//! Host side of the link: frame reader, command formatting, device session
//!
//! Used by the `link-host` binary and by the integration tests.

use std::path::PathBuf;

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::link::command::COMMAND_PREFIX;
use crate::link::{decode_header, HEADER_LEN};

/// Largest frame accepted from the device
///
/// Must stay below 0x0020_3A41, the smallest length whose little-endian
/// bytes start with `A: `; that keeps confirmation lines distinguishable
/// from frame headers.
pub const MAX_FRAME_LEN: u32 = 2 * 1024 * 1024;

const CONFIRMATION_PREFIX: &[u8] = b"A: ";
const MAX_CONFIRMATION_LEN: u64 = 128;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame length {0} exceeds the 2 MiB limit")]
    FrameTooLarge(u32),

    #[error("stream ended inside a message")]
    Truncated,
}

/// One message read off the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Frame(Bytes),
    Confirmation(String),
}

pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Reads the next message; `Ok(None)` on a clean close between messages
    pub async fn next_message(&mut self) -> Result<Option<LinkMessage>, ReadError> {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = self.inner.read(&mut header[filled..]).await?;
            if n == 0 {
                return if filled == 0 { Ok(None) } else { Err(ReadError::Truncated) };
            }
            filled += n;
        }

        if header.starts_with(CONFIRMATION_PREFIX) {
            return self.read_confirmation(header).await.map(Some);
        }

        let len = decode_header(header);
        if len > MAX_FRAME_LEN {
            return Err(ReadError::FrameTooLarge(len));
        }

        let mut payload = BytesMut::zeroed(len as usize);
        self.inner.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ReadError::Truncated
            } else {
                ReadError::Io(e)
            }
        })?;

        Ok(Some(LinkMessage::Frame(payload.freeze())))
    }

    async fn read_confirmation(&mut self, header: [u8; HEADER_LEN]) -> Result<LinkMessage, ReadError> {
        let mut line = header.to_vec();
        if header[HEADER_LEN - 1] != b'\n' {
            let mut limited = (&mut self.inner).take(MAX_CONFIRMATION_LEN);
            limited.read_until(b'\n', &mut line).await?;
            if line.last() != Some(&b'\n') {
                return Err(ReadError::Truncated);
            }
        }

        Ok(LinkMessage::Confirmation(String::from_utf8_lossy(&line).trim().to_string()))
    }
}

/// Wire form of a command
pub fn format_command(angle_a: i64, angle_b: i64) -> String {
    format!("{}{},{}\n", COMMAND_PREFIX, angle_a, angle_b)
}

/// Parses operator input such as `90,45`
///
/// Strict on purpose: typos are reported to the operator instead of being
/// sent as 0.
pub fn parse_operator_input(input: &str) -> Result<(i64, i64), String> {
    let (a, b) = input
        .trim()
        .split_once(',')
        .ok_or_else(|| "expected two angles separated by a comma, e.g. 90,45".to_string())?;

    let parse = |s: &str| {
        s.trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s.trim()))
    };
    Ok((parse(a)?, parse(b)?))
}

/// Runs one device connection until it closes or `stop` changes
///
/// Frames land in `out_dir` as `frame_NNNN.jpg`, reusing names after `ring`
/// files. Commands from `cmd_rx` are written to the device as they arrive.
pub async fn serve_device(
    stream: TcpStream,
    out_dir: PathBuf,
    ring: u64,
    cmd_rx: &mut mpsc::Receiver<String>,
    stop: &mut watch::Receiver<bool>,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (rd, mut wr) = stream.into_split();

    // Frame reads are not cancel-safe, so they get their own task
    let mut receiver = tokio::spawn(receive_frames(rd, out_dir, ring.max(1)));

    loop {
        tokio::select! {
            finished = &mut receiver => return finished?,
            Ok(()) = stop.changed() => {
                receiver.abort();
                log::info!("Closing device session");
                return Ok(());
            }
            Some(command) = cmd_rx.recv() => {
                if let Err(e) = wr.write_all(command.as_bytes()).await {
                    receiver.abort();
                    return Err(e.into());
                }
                log::debug!("Sent command: {}", command.trim_end());
            }
        }
    }
}

async fn receive_frames(rd: OwnedReadHalf, out_dir: PathBuf, ring: u64) -> anyhow::Result<()> {
    let mut reader = FrameReader::new(rd);
    let mut frame_count = 0u64;

    while let Some(message) = reader.next_message().await? {
        match message {
            LinkMessage::Frame(data) => {
                let path = out_dir.join(format!("frame_{:04}.jpg", frame_count % ring));
                tokio::fs::write(&path, &data).await?;
                frame_count += 1;
                log::debug!("Frame {} ({} bytes) -> {}", frame_count, data.len(), path.display());

                if frame_count % 25 == 0 {
                    log::info!("Received {} frames", frame_count);
                }
            }
            LinkMessage::Confirmation(text) => log::info!("Device: {}", text),
        }
    }

    Ok(())
}
