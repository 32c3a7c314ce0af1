//! Output Device Enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// An output device as reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevice {
    /// Unique identifier for this device
    pub id: String,

    /// Human-readable device name
    pub name: String,

    /// Whether this is the system default output
    pub is_default: bool,

    /// Supported sample rates (may be empty if querying failed)
    pub sample_rates: Vec<u32>,

    /// Maximum supported output channels
    pub max_channels: u16,
}

impl AudioDevice {
    /// Enumerate the output devices of the default cpal host
    pub fn enumerate_outputs() -> EngineResult<Vec<AudioDevice>> {
        let host = cpal::default_host();

        let default_name = host.default_output_device().and_then(|d| d.name().ok());

        let devices: Vec<AudioDevice> = host
            .output_devices()
            .map_err(|e| EngineError::Device(e.to_string()))?
            .filter_map(|device| Self::from_cpal_device(&device, default_name.as_deref()).ok())
            .collect();

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }

        Ok(devices)
    }

    /// Get the default output device
    pub fn default_output() -> EngineResult<AudioDevice> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(EngineError::NoDevicesFound)?;

        Self::from_cpal_device(&device, None).map(|mut d| {
            d.is_default = true;
            d
        })
    }

    /// Resolve a cpal output device by name, or the default when `name` is `None`
    pub(crate) fn find_cpal_output(name: Option<&str>) -> EngineResult<cpal::Device> {
        let host = cpal::default_host();
        match name {
            None => host.default_output_device().ok_or(EngineError::NoDevicesFound),
            Some(wanted) => host
                .output_devices()
                .map_err(|e| EngineError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == wanted).unwrap_or(false))
                .ok_or_else(|| EngineError::Device(format!("Device not found: {wanted}"))),
        }
    }

    pub(crate) fn from_cpal_device(
        device: &cpal::Device,
        default_name: Option<&str>,
    ) -> EngineResult<Self> {
        let name = device
            .name()
            .map_err(|e| EngineError::Device(e.to_string()))?;

        // cpal has no separate device ids
        let id = name.clone();
        let is_default = default_name.map(|d| d == name).unwrap_or(false);

        let (sample_rates, max_channels) = match device.supported_output_configs() {
            Ok(configs) => Self::extract_config_info(configs),
            Err(_) => (vec![], 2),
        };

        Ok(AudioDevice {
            id,
            name,
            is_default,
            sample_rates,
            max_channels,
        })
    }

    fn extract_config_info(
        configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    ) -> (Vec<u32>, u16) {
        let mut sample_rates = Vec::new();
        let mut max_channels = 0u16;

        const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

        for config in configs {
            max_channels = max_channels.max(config.channels());

            let min = config.min_sample_rate().0;
            let max = config.max_sample_rate().0;

            for &rate in &COMMON_RATES {
                if rate >= min && rate <= max && !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }
        }

        sample_rates.sort_unstable();
        (sample_rates, max_channels)
    }
}
