//! Output device enumeration using cpal
//!
//! Used by the headless backend to report real device names and by the
//! device watcher to notice when the system default changes.

use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use tracing::debug;

/// Names of every output device the default host exposes.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::Device(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Name of the system default output device, if one is available.
pub fn default_output_device_name() -> Option<String> {
    cpal::default_host()
        .default_output_device()
        .and_then(|device| device.name().ok())
}
