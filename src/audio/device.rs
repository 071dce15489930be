//! Output device enumeration and the cpal backend

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::audio::output::{CpalOutput, OutputBackend, OutputSession, RoutedBlock};
use crate::error::AudioError;

/// What the playback engine needs to know about an output device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDeviceInfo {
    /// `output:<name>`
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    /// Channel capacity: the widest layout any supported config offers
    pub max_channels: u16,
}

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    pub fn info(&self, is_default: bool) -> OutputDeviceInfo {
        let (sample_rates, max_channels) = get_device_capabilities(&self.inner);
        OutputDeviceInfo {
            id: device_id(&self.name),
            name: self.name.clone(),
            is_default,
            sample_rates,
            max_channels,
        }
    }
}

fn device_id(name: &str) -> String {
    format!("output:{}", name)
}

/// List all available output devices
pub fn list_devices() -> Vec<OutputDeviceInfo> {
    let host = cpal::default_host();
    let default_output_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(output_devices) = host.output_devices() {
        for device in output_devices {
            let device = AudioDevice::from_cpal(device);
            let is_default = default_output_name.as_ref() == Some(&device.name);
            devices.push(device.info(is_default));
        }
    }
    devices
}

/// Supported sample rates and channel capacity
fn get_device_capabilities(device: &cpal::Device) -> (Vec<u32>, u16) {
    let mut rates = Vec::new();
    let mut max_channels = 0u16;

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate_val in [44100u32, 48000, 88200, 96000, 176400, 192000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !rates.contains(&rate_val)
                {
                    rates.push(rate_val);
                }
            }
            max_channels = max_channels.max(config.channels());
        }
    }

    rates.sort();
    (rates, max_channels)
}

/// Get an output device by its ID; an empty ID means the host default
pub fn get_device_by_id(id: &str) -> Result<AudioDevice, AudioError> {
    let host = cpal::default_host();

    if id.is_empty() {
        return host
            .default_output_device()
            .map(AudioDevice::from_cpal)
            .ok_or_else(|| AudioError::InvalidAudioDevice("No default output device".to_string()));
    }

    let name = id.strip_prefix("output:").unwrap_or(id);
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::InvalidAudioDevice(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(AudioDevice::from_cpal(device));
            }
        }
    }

    Err(AudioError::InvalidAudioDevice(id.to_string()))
}

/// Plays through the system's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl OutputBackend for CpalBackend {
    fn output_device(&self, device_id: &str) -> Result<OutputDeviceInfo, AudioError> {
        let device = get_device_by_id(device_id)?;
        let is_default = cpal::default_host()
            .default_output_device()
            .and_then(|d| d.name().ok())
            .map(|name| name == device.name)
            .unwrap_or(false);
        let info = device.info(is_default);
        if info.max_channels == 0 {
            return Err(AudioError::InvalidAudioDevice(format!("{} has no output channels", info.id)));
        }
        Ok(info)
    }

    fn start(&self, device: &OutputDeviceInfo, block: RoutedBlock) -> Result<Box<dyn OutputSession>, AudioError> {
        let output = CpalOutput::start(&device.id, block)?;
        Ok(Box::new(output))
    }
}
