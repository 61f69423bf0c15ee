use bytes::BytesMut;
use std::time::Duration;
use v4l::{
    buffer::Type,
    io::{mmap::Stream as MmapStream, traits::CaptureStream},
    video::{capture::Parameters, Capture},
    Device, Format, FourCC,
};

use super::{CaptureError, Frame, FrameSource};
use crate::config::CameraConfig;

const MJPEG: &[u8; 4] = b"MJPG";

/// MJPEG capture from a V4L2 device
///
/// Each frame is copied out of the driver's mmap buffer so the buffer can be
/// re-queued right away; the copy is recycled once the link releases it.
pub struct V4lCamera {
    stream: MmapStream<'static>,
    spare: Option<BytesMut>,
    in_flight: bool,
}

impl V4lCamera {
    pub fn new(config: &CameraConfig) -> Result<Self, CaptureError> {
        let device = Device::with_path(&config.device)?;

        let requested = Format::new(config.width, config.height, FourCC::new(MJPEG));
        let fmt = device.set_format(&requested)?;
        if fmt.fourcc != FourCC::new(MJPEG) {
            return Err(CaptureError::Format(format!(
                "{} does not deliver MJPEG (got {})",
                config.device, fmt.fourcc
            )));
        }
        log::info!("Camera format set for {}: {}", config.device, fmt);

        let params = device.set_params(&Parameters::with_fps(config.fps))?;
        log::info!("Camera frame interval for {}: {}", config.device, params.interval);

        // The device lives for the rest of the process
        let static_dev: &'static Device = Box::leak(Box::new(device));
        let mut stream = MmapStream::with_buffers(static_dev, Type::VideoCapture, config.buffer_count)?;
        stream.set_timeout(Duration::from_millis(config.capture_timeout_ms));

        Ok(Self {
            stream,
            spare: None,
            in_flight: false,
        })
    }
}

impl FrameSource for V4lCamera {
    fn acquire_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.in_flight {
            return Err(CaptureError::FrameInFlight);
        }

        let (buf, meta) = self.stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Err(CaptureError::EmptyFrame);
        }

        let mut data = self.spare.take().unwrap_or_default();
        data.clear();
        data.extend_from_slice(&buf[..used]);

        self.in_flight = true;
        Ok(Frame::new(data.freeze()))
    }

    fn release_frame(&mut self, frame: Frame) {
        self.in_flight = false;
        // Reclaim the allocation when the link kept no other handle to it
        if let Ok(buf) = frame.into_bytes().try_into_mut() {
            self.spare = Some(buf);
        }
    }
}
