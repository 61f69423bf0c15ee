//! Camera/servo link firmware for the wearable glasses rig
//!
//! The device streams camera frames to a host over Bluetooth serial or WiFi
//! TCP and takes servo positions back on the same channel:
//! - outbound: `u32 little-endian length || JPEG bytes`, one frame per tick
//! - inbound: `CMD:<angle A>,<angle B>\n`, clamped to `0..=180`
//!
//! # Example
//!
//! ```no_run
//! use glasses_link::config::Config;
//! use glasses_link::{ActuatorState, Angle, LinkLoop, ServoBank, V4lCamera, WifiClient};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load("config.toml")?;
//! let transport = WifiClient::new(&config.wifi, &config.link);
//! let camera = V4lCamera::new(&config.camera)?;
//! let servos = ServoBank::new(&config.actuators)?;
//! let start = ActuatorState::new(Angle::clamped(30), Angle::clamped(120));
//!
//! let mut link = LinkLoop::new(transport, camera, servos, start, config.link.clone());
//! link.tick();
//! # Ok(())
//! # }
//! ```

pub mod actuator;
pub mod camera;
pub mod config;
pub mod host;
pub mod link;
pub mod platform;
pub mod transport;

// Re-exports for convenience
pub use actuator::{ActuatorBank, ActuatorId, ActuatorState, Angle, ServoBank};
pub use camera::{CaptureError, Frame, FrameSource, V4lCamera};
pub use link::{Command, LinkLoop, LinkState, LinkStats, TickOutcome};
pub use transport::{BluetoothSerial, LineBuffer, Transport, TransportError, WifiClient};
