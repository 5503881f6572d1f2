//! Audio device enumeration and lookup
//!
//! Devices are listed from every available host (ALSA, JACK, PulseAudio,
//! CoreAudio, WASAPI...). On Linux with JACK running, JACK shows a single
//! device while ALSA lists the hardware, so headphone cueing on a second
//! card usually means picking an ALSA device.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Which side of the device a lookup concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceDirection {
    Output,
    Input,
}

impl DeviceDirection {
    fn label(self) -> &'static str {
        match self {
            DeviceDirection::Output => "output",
            DeviceDirection::Input => "input",
        }
    }
}

/// Display name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|&id| host_name(id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn host_devices(host: &Host, direction: DeviceDirection) -> Option<Vec<cpal::Device>> {
    let devices: Result<Vec<cpal::Device>, cpal::DevicesError> = match direction {
        DeviceDirection::Output => host.output_devices().map(|d| d.collect()),
        DeviceDirection::Input => host.input_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices: {}", direction.label(), e);
            None
        }
    }
}

fn host_default(host: &Host, direction: DeviceDirection) -> Option<cpal::Device> {
    match direction {
        DeviceDirection::Output => host.default_output_device(),
        DeviceDirection::Input => host.default_input_device(),
    }
}

/// Sample rates and channel count a device advertises
fn capabilities(device: &cpal::Device, direction: DeviceDirection) -> Option<(Vec<u32>, u16)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        DeviceDirection::Output => device.supported_output_configs().ok()?.collect(),
        DeviceDirection::Input => device.supported_input_configs().ok()?.collect(),
    };
    if ranges.is_empty() {
        return None;
    }

    let mut sample_rates = Vec::new();
    let mut max_channels = 0u16;
    for range in &ranges {
        max_channels = max_channels.max(range.channels());
        for rate in [44100, 48000, 88200, 96000, 176400, 192000] {
            if rate >= range.min_sample_rate().0
                && rate <= range.max_sample_rate().0
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
    }
    sample_rates.sort_unstable();
    Some((sample_rates, max_channels))
}

/// An audio device and what it supports
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Identifier for configuration (includes host)
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g. "ALSA", "JACK")
    pub host: String,
    /// System default for its host
    pub is_default: bool,
    /// Common sample rates within the supported ranges
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// List devices of one direction from all hosts
///
/// Defaults come first, then devices are ordered by host and name.
pub fn list_devices(direction: DeviceDirection) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host_default(&host, direction).and_then(|d| d.name().ok());

        for device in host_devices(&host, direction).unwrap_or_default() {
            let Ok(name) = device.name() else {
                continue;
            };
            let Some((sample_rates, max_channels)) = capabilities(&device, direction) else {
                continue;
            };
            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction.label()));
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} {} devices",
        all_devices.len(),
        direction.label()
    );
    Ok(all_devices)
}

/// All output devices
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    list_devices(DeviceDirection::Output)
}

/// All capture devices
pub fn get_input_devices() -> AudioResult<Vec<AudioDevice>> {
    list_devices(DeviceDirection::Input)
}

/// Output devices for a settings list; empty when enumeration fails
pub fn get_available_output_devices() -> Vec<AudioDevice> {
    get_output_devices().unwrap_or_else(|e| {
        log::warn!("Failed to enumerate audio devices: {}", e);
        Vec::new()
    })
}

/// Find a device by its ID
///
/// Uses the host in the ID when given, otherwise searches every host.
pub fn find_device_by_id(id: &DeviceId, direction: DeviceDirection) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_deref() == Some(id.name.as_str());

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host_devices(&host, direction)
            .and_then(|devices| devices.into_iter().find(matches))
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host_devices(&host, direction))
        .flatten()
        .find(matches)
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// Default device of the default host
pub fn default_device(direction: DeviceDirection) -> AudioResult<cpal::Device> {
    host_default(&cpal::default_host(), direction).ok_or_else(|| {
        AudioError::NoDefaultDevice(format!("no default {} device", direction.label()))
    })
}

/// The configured device, or the system default when none is set
pub fn resolve_device(
    id: Option<&DeviceId>,
    direction: DeviceDirection,
) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => find_device_by_id(id, direction),
        None => default_device(direction),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_names() {
        for host_id in cpal::available_hosts() {
            let name = host_name(host_id);
            assert!(!name.is_empty());
            assert!(get_host_by_name(&name).is_some());
        }
    }

    #[test]
    fn test_device_enumeration() {
        // No devices is fine (CI); anything else must be well-formed
        for direction in [DeviceDirection::Output, DeviceDirection::Input] {
            match list_devices(direction) {
                Ok(devices) => {
                    for device in &devices {
                        assert!(!device.name.is_empty());
                        assert_eq!(device.id.host.as_deref(), Some(device.host.as_str()));
                    }
                    // Defaults sort first
                    let first_non_default = devices.iter().position(|d| !d.is_default);
                    if let Some(pos) = first_non_default {
                        assert!(devices[pos..].iter().all(|d| !d.is_default));
                    }
                }
                Err(e) => println!("No {} devices: {}", direction.label(), e),
            }
        }
    }

    #[test]
    fn test_unknown_device_not_found() {
        let id = DeviceId::new("definitely-not-a-real-device-7f3a");
        assert!(matches!(
            find_device_by_id(&id, DeviceDirection::Output),
            Err(AudioError::DeviceNotFound(_))
        ));
    }
}
