//! Platform detection and bring-up diagnostics

use std::env;
use std::fs;
use std::path::Path;

/// Platform information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformInfo {
    /// Raspberry Pi (detected via the device tree)
    RaspberryPi,

    /// Any other Linux board; PWM and camera may still work
    Linux,

    /// Not Linux: hardware backends will fail to open
    Unsupported,
}

/// Detects current platform
pub fn detect_platform() -> PlatformInfo {
    match env::consts::OS {
        "linux" => {
            if is_raspberry_pi() {
                PlatformInfo::RaspberryPi
            } else {
                PlatformInfo::Linux
            }
        }
        _ => PlatformInfo::Unsupported,
    }
}

fn is_raspberry_pi() -> bool {
    ["/proc/device-tree/model", "/sys/firmware/devicetree/base/model"]
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .any(|model| model.contains("Raspberry Pi"))
}

/// Formats a MAC address as `AA:BB:CC:DD:EE:FF`
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses the sysfs `address` attribute
pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Reads the MAC of a Bluetooth adapter, e.g. `hci0`
pub fn bluetooth_mac(adapter: &str) -> Option<[u8; 6]> {
    let path = Path::new("/sys/class/bluetooth").join(adapter).join("address");
    parse_mac(&fs::read_to_string(path).ok()?)
}

/// Logs what the host needs to pair with the device
pub fn log_bringup(device_name: &str) {
    let platform = detect_platform();
    log::info!("Platform: {:?}", platform);
    if platform == PlatformInfo::Unsupported {
        log::warn!("Not running on Linux; camera, PWM and RFCOMM backends will not open");
    }

    match bluetooth_mac("hci0") {
        Some(mac) => log::info!("Bluetooth MAC: {} (name {})", format_mac(&mac), device_name),
        None => log::warn!("No Bluetooth adapter found at hci0"),
    }
}
