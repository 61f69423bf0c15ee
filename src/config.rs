//! Configuration for the glasses link firmware

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::actuator::MAX_ANGLE;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete firmware configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub bluetooth: BluetoothConfig,

    #[serde(default)]
    pub wifi: WifiConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub actuators: ActuatorConfig,
}

/// Link loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Wait applied on every tick without a connected peer
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Back-off after a failed frame capture
    #[serde(default = "default_capture_backoff_ms")]
    pub capture_backoff_ms: u64,

    /// Delay after every transmitted frame
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Consecutive capture failures before a warning is logged
    #[serde(default = "default_capture_failure_warn_threshold")]
    pub capture_failure_warn_threshold: u32,

    /// Frames between two stats log lines (0 disables)
    #[serde(default = "default_stats_interval_frames")]
    pub stats_interval_frames: u64,

    /// Longest inbound line kept before the buffer is discarded
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Complete lines held for later ticks; the oldest is dropped past this
    #[serde(default = "default_max_queued_lines")]
    pub max_queued_lines: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: default_idle_wait_ms(),
            capture_backoff_ms: default_capture_backoff_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            capture_failure_warn_threshold: default_capture_failure_warn_threshold(),
            stats_interval_frames: default_stats_interval_frames(),
            max_line_len: default_max_line_len(),
            max_queued_lines: default_max_queued_lines(),
        }
    }
}

impl LinkConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn capture_backoff(&self) -> Duration {
        Duration::from_millis(self.capture_backoff_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Bluetooth,
    Wifi,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
}

/// Bluetooth serial (RFCOMM) backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BluetoothConfig {
    /// Name the adapter advertises to the host OS
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// tty node bound by `rfcomm watch`
    #[serde(default = "default_rfcomm_path")]
    pub rfcomm_path: String,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            rfcomm_path: default_rfcomm_path(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

/// WiFi TCP client backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    /// Host the device connects to
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

/// V4L2 camera settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_camera_device")]
    pub device: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Driver-side mmap buffers
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// Longest wait for one dequeued buffer
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            buffer_count: default_buffer_count(),
            capture_timeout_ms: default_capture_timeout_ms(),
        }
    }
}

/// Servo pair on the hardware PWM channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_angle_a")]
    pub default_angle_a: u8,

    #[serde(default = "default_angle_b")]
    pub default_angle_b: u8,

    /// Pulse width at 0 degrees
    #[serde(default = "default_min_pulse_us")]
    pub min_pulse_us: u64,

    /// Pulse width at 180 degrees
    #[serde(default = "default_max_pulse_us")]
    pub max_pulse_us: u64,

    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            default_angle_a: default_angle_a(),
            default_angle_b: default_angle_b(),
            min_pulse_us: default_min_pulse_us(),
            max_pulse_us: default_max_pulse_us(),
            period_ms: default_period_ms(),
        }
    }
}

// Default value functions
fn default_idle_wait_ms() -> u64 {
    500
}
fn default_capture_backoff_ms() -> u64 {
    1000
}
fn default_frame_interval_ms() -> u64 {
    1000
}
fn default_capture_failure_warn_threshold() -> u32 {
    5
}
fn default_stats_interval_frames() -> u64 {
    100
}
fn default_max_line_len() -> usize {
    256
}
fn default_max_queued_lines() -> usize {
    4
}
fn default_device_name() -> String {
    "GLASSES_CAM_BT".to_string()
}
fn default_rfcomm_path() -> String {
    "/dev/rfcomm0".to_string()
}
fn default_write_timeout_ms() -> u64 {
    2000
}
fn default_host() -> String {
    "192.168.4.2".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_width() -> u32 {
    320
}
fn default_height() -> u32 {
    240
}
fn default_fps() -> u32 {
    15
}
fn default_buffer_count() -> u32 {
    2
}
fn default_capture_timeout_ms() -> u64 {
    500
}
fn default_angle_a() -> u8 {
    30
}
fn default_angle_b() -> u8 {
    120
}
fn default_min_pulse_us() -> u64 {
    544
}
fn default_max_pulse_us() -> u64 {
    2400
}
fn default_period_ms() -> u64 {
    20
}

impl Config {
    /// Loads configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Loads configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let link = &self.link;
        if link.idle_wait_ms == 0 || link.capture_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "link: idle_wait_ms and capture_backoff_ms must be > 0".to_string(),
            ));
        }
        if link.max_line_len == 0 || link.max_queued_lines == 0 {
            return Err(ConfigError::Invalid(
                "link: max_line_len and max_queued_lines must be > 0".to_string(),
            ));
        }

        match self.transport.kind {
            TransportKind::Wifi => {
                if self.wifi.host.trim().is_empty() {
                    return Err(ConfigError::Invalid("wifi: host must not be empty".to_string()));
                }
                if self.wifi.port == 0 {
                    return Err(ConfigError::Invalid("wifi: port must be > 0".to_string()));
                }
                if self.wifi.connect_timeout_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "wifi: connect_timeout_ms must be > 0".to_string(),
                    ));
                }
            }
            TransportKind::Bluetooth => {
                if self.bluetooth.rfcomm_path.is_empty() {
                    return Err(ConfigError::Invalid(
                        "bluetooth: rfcomm_path must not be empty".to_string(),
                    ));
                }
            }
        }

        self.validate_camera()?;
        self.validate_actuators()
    }

    fn validate_camera(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if cam.width == 0 || cam.height == 0 {
            return Err(ConfigError::Invalid(
                "camera: width and height must be > 0".to_string(),
            ));
        }

        if cam.fps == 0 || cam.fps > 120 {
            return Err(ConfigError::Invalid(format!(
                "camera: fps must be between 1 and 120, got {}",
                cam.fps
            )));
        }

        if cam.buffer_count == 0 {
            return Err(ConfigError::Invalid(
                "camera: buffer_count must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_actuators(&self) -> Result<(), ConfigError> {
        let act = &self.actuators;
        for (name, angle) in [("default_angle_a", act.default_angle_a), ("default_angle_b", act.default_angle_b)] {
            if angle > MAX_ANGLE {
                return Err(ConfigError::Invalid(format!(
                    "actuators: {} must be <= {}, got {}",
                    name, MAX_ANGLE, angle
                )));
            }
        }

        if act.min_pulse_us >= act.max_pulse_us {
            return Err(ConfigError::Invalid(format!(
                "actuators: min_pulse_us ({}) must be below max_pulse_us ({})",
                act.min_pulse_us, act.max_pulse_us
            )));
        }

        if act.max_pulse_us >= act.period_ms.saturating_mul(1000) {
            return Err(ConfigError::Invalid(format!(
                "actuators: max_pulse_us ({}) does not fit in a {} ms period",
                act.max_pulse_us, act.period_ms
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.kind, TransportKind::Bluetooth);
        assert_eq!(config.bluetooth.device_name, "GLASSES_CAM_BT");
        assert_eq!(config.actuators.default_angle_a, 30);
        assert_eq!(config.actuators.default_angle_b, 120);
        assert_eq!(config.link.frame_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.wifi.port, 8080);
        assert_eq!(config.camera.width, 320);
        assert_eq!(config.link.idle_wait_ms, 500);
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[link]
idle_wait_ms = 250
frame_interval_ms = 100

[transport]
kind = "wifi"

[wifi]
host = "10.0.0.5"
port = 1234

[camera]
device = "/dev/video2"
width = 640
height = 480
fps = 30

[actuators]
default_angle_a = 90
default_angle_b = 90
        "#;

        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.link.idle_wait_ms, 250);
        assert_eq!(config.link.capture_backoff_ms, 1000);
        assert_eq!(config.transport.kind, TransportKind::Wifi);
        assert_eq!(config.wifi.host, "10.0.0.5");
        assert_eq!(config.wifi.port, 1234);
        assert_eq!(config.camera.device, "/dev/video2");
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.actuators.default_angle_a, 90);
    }

    #[test]
    fn test_invalid_default_angle() {
        let toml = r#"
[actuators]
default_angle_b = 200
        "#;

        assert!(matches!(Config::from_toml(toml), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_pulse_range() {
        let toml = r#"
[actuators]
min_pulse_us = 2400
max_pulse_us = 544
        "#;

        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_huge_pwm_period_is_accepted() {
        let toml = r#"
[actuators]
period_ms = 9223372036854775807
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.actuators.period_ms, i64::MAX as u64);
    }

    #[test]
    fn test_zero_line_queue_rejected() {
        let toml = r#"
[link]
max_queued_lines = 0
        "#;

        assert!(matches!(Config::from_toml(toml), Err(ConfigError::Invalid(_))));
        assert_eq!(Config::default().link.max_queued_lines, 4);
    }

    #[test]
    fn test_wifi_port_zero_rejected() {
        let toml = r#"
[transport]
kind = "wifi"

[wifi]
port = 0
        "#;

        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_unknown_transport_kind() {
        let toml = r#"
[transport]
kind = "carrier-pigeon"
        "#;

        assert!(matches!(Config::from_toml(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[camera]\nfps = 10").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.camera.fps, 10);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/glasses.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = Config::from_toml(&toml_str).unwrap();

        assert_eq!(config.wifi.port, parsed.wifi.port);
        assert_eq!(config.bluetooth.rfcomm_path, parsed.bluetooth.rfcomm_path);
    }
}
