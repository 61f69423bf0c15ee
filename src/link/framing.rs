//! Outbound frame framing: `u32 length (little-endian) || payload`
//!
//! No magic, checksum or acknowledgement; the host knows this layout up front.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::transport::{Transport, TransportError};

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("frame of {0} bytes does not fit a u32 length prefix")]
    TooLarge(usize),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

pub fn encode_header(payload_len: usize) -> Result<[u8; HEADER_LEN], FramingError> {
    let len = u32::try_from(payload_len).map_err(|_| FramingError::TooLarge(payload_len))?;
    Ok(len.to_le_bytes())
}

pub fn decode_header(header: [u8; HEADER_LEN]) -> u32 {
    u32::from_le_bytes(header)
}

/// Builds the complete wire message in one buffer
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FramingError> {
    let header = encode_header(payload.len())?;
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_slice(&header);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Writes header then payload back to back; returns the bytes put on the wire
pub fn write_frame<T: Transport + ?Sized>(transport: &mut T, payload: &[u8]) -> Result<usize, FramingError> {
    let header = encode_header(payload.len())?;
    transport.write_bytes(&header)?;
    transport.write_bytes(payload)?;
    Ok(HEADER_LEN + payload.len())
}
