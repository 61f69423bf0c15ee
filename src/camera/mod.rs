//! Frame acquisition

mod v4l_source;

pub use v4l_source::V4lCamera;

use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("camera returned an empty buffer")]
    EmptyFrame,

    #[error("previous frame has not been released")]
    FrameInFlight,

    #[error("unsupported format: {0}")]
    Format(String),
}

/// One captured image, opaque to the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// Supplies frames one at a time
///
/// A source hands out at most one frame; it must be given back with
/// [`FrameSource::release_frame`] before the next one is acquired.
pub trait FrameSource {
    fn acquire_frame(&mut self) -> Result<Frame, CaptureError>;

    fn release_frame(&mut self, frame: Frame);
}

