//! Audio output device enumeration and lookup via cpal.

use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::{Error, Result};

/// Extract device name via `description()` (cpal 0.17+).
pub(crate) fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// An audio output device, ready to back a device sink node.
pub struct OutputDevice {
    /// Human-readable device name.
    pub name: String,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Channel count of the default output configuration.
    pub channels: u16,
    pub(crate) device: Device,
}

impl std::fmt::Debug for OutputDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputDevice")
            .field("name", &self.name)
            .field("default_sample_rate", &self.default_sample_rate)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

fn probe(device: Device) -> Result<OutputDevice> {
    let name = device_name(&device).map_err(|e| Error::DeviceProbe(e.to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| Error::DeviceProbe(format!("{name}: {e}")))?;
    Ok(OutputDevice {
        name,
        default_sample_rate: config.sample_rate(),
        channels: config.channels(),
        device,
    })
}

/// Lists all available audio output devices.
pub fn list_output_devices() -> Result<Vec<OutputDevice>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(probed) = probe(device) {
                devices.push(probed);
            }
        }
    }
    Ok(devices)
}

/// Returns the platform default output device.
///
/// This is the fallback target for backend-disconnect recovery.
pub fn default_output_device() -> Result<OutputDevice> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(Error::NoDevice)?;
    probe(device)
}

/// Finds an output device by index, exact name, or case-insensitive
/// partial name.
pub fn find_output_device(name_or_index: &str) -> Result<OutputDevice> {
    let host = cpal::default_host();
    let devices: Vec<Device> = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?
        .collect();

    if let Ok(index) = name_or_index.parse::<usize>() {
        let device = devices.into_iter().nth(index).ok_or_else(|| {
            Error::DeviceNotFound(format!("output device index {index}"))
        })?;
        return probe(device);
    }

    // Exact match first.
    for device in &devices {
        if device_name(device).is_ok_and(|n| n == name_or_index) {
            return probe(device.clone());
        }
    }

    // Then case-insensitive partial match.
    let search = name_or_index.to_lowercase();
    for device in devices {
        if device_name(&device).is_ok_and(|n| n.to_lowercase().contains(&search)) {
            return probe(device);
        }
    }

    Err(Error::DeviceNotFound(format!(
        "no output device matching '{name_or_index}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_devices_does_not_panic() {
        // Device availability depends on the system; only the call path is
        // under test here.
        let result = list_output_devices();
        assert!(result.is_ok());
    }
}
