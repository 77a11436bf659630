//! Sound-card collaborators built on cpal.
//!
//! The cpal callbacks run on the host's audio thread and only touch a
//! [`SharedRing`]: the input callback pushes (counting overruns), the output
//! callback pulls with zero-fill (counting underruns). The graph side reads
//! and writes the same ring through [`AudioInput`] / [`AudioOutput`].

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host};
use onda_core::SharedRing;

use crate::audio::{AudioInput, AudioOutput};
use crate::{Error, Result};

/// Ring length in seconds of audio.
const RING_SECONDS: f64 = 0.25;

fn device_name(device: &Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Sound-card summary for listings.
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Human-readable device name.
    pub name: String,
    /// Whether the device can capture.
    pub is_input: bool,
    /// Whether the device can play.
    pub is_output: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
}

/// Lists the names of the host's sound cards.
pub fn list_audio_devices() -> Result<Vec<AudioDevice>> {
    let host = cpal::default_host();
    let mut devices: Vec<AudioDevice> = Vec::new();

    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            let Ok(name) = device_name(&device) else {
                continue;
            };
            devices.push(AudioDevice {
                name,
                is_input: true,
                is_output: device.default_output_config().is_ok(),
                default_sample_rate: device
                    .default_input_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(48000),
            });
        }
    }

    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            let Ok(name) = device_name(&device) else {
                continue;
            };
            if devices.iter().any(|d| d.name == name) {
                continue;
            }
            devices.push(AudioDevice {
                name,
                is_input: false,
                is_output: true,
                default_sample_rate: device
                    .default_output_config()
                    .map(|c| c.sample_rate())
                    .unwrap_or(48000),
            });
        }
    }

    Ok(devices)
}

fn whole_rate(sample_rate: f64) -> Result<u32> {
    if sample_rate.is_finite() && sample_rate >= 1.0 && sample_rate.fract() == 0.0 {
        Ok(sample_rate as u32)
    } else {
        Err(Error::Configuration(format!(
            "audio rate {sample_rate} Hz must be a positive whole number"
        )))
    }
}

fn find_device(host: &Host, name: Option<&str>, input: bool) -> Result<Device> {
    let kind = if input { "input" } else { "output" };
    let Some(search) = name else {
        let default = if input {
            host.default_input_device()
        } else {
            host.default_output_device()
        };
        return default.ok_or_else(|| Error::DeviceUnavailable(format!("no default {kind} device")));
    };

    let search_lower = search.to_lowercase();
    let devices = if input {
        host.input_devices()
    } else {
        host.output_devices()
    }
    .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    for device in devices {
        if let Ok(dev_name) = device_name(&device)
            && dev_name.to_lowercase().contains(search_lower.as_str())
        {
            return Ok(device);
        }
    }
    Err(Error::DeviceUnavailable(format!(
        "no {kind} device matching '{search}'"
    )))
}

fn build_error(e: cpal::BuildStreamError) -> Error {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable
        | cpal::BuildStreamError::StreamConfigNotSupported => {
            Error::DeviceUnavailable(e.to_string())
        }
        other => Error::Stream(other.to_string()),
    }
}

/// Microphone capture, mixed down to mono.
pub struct CpalInput {
    ring: SharedRing<f32>,
    sample_rate: f64,
    _stream: cpal::Stream,
}

impl CpalInput {
    /// Opens `device` (fuzzy name match) or the default input at `sample_rate`.
    pub fn open(device: Option<&str>, sample_rate: f64) -> Result<Self> {
        let rate = whole_rate(sample_rate)?;
        let host = cpal::default_host();
        let device = find_device(&host, device, true)?;
        let channels = device
            .default_input_config()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .channels();

        let config = cpal::StreamConfig {
            channels,
            sample_rate: rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let ring = SharedRing::with_capacity((sample_rate * RING_SECONDS) as usize);
        let producer = ring.clone();
        let width = usize::from(channels.max(1));
        let mut mono = Vec::new();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    mono.clear();
                    mono.extend(
                        data.chunks(width)
                            .map(|frame| frame.iter().sum::<f32>() / width as f32),
                    );
                    producer.push(&mono);
                },
                move |err| tracing::error!(error = %err, "audio input stream error"),
                None,
            )
            .map_err(build_error)?;
        stream.play().map_err(|e| Error::Stream(e.to_string()))?;

        tracing::info!(
            device = device_name(&device).unwrap_or_default(),
            channels,
            sample_rate = rate,
            "audio input started"
        );
        Ok(Self {
            ring,
            sample_rate,
            _stream: stream,
        })
    }

    /// Callback deliveries that did not fit in the ring.
    pub fn overruns(&self) -> u64 {
        self.ring.overruns()
    }
}

impl AudioInput for CpalInput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn read(&mut self, out: &mut [f32]) -> Result<usize> {
        Ok(self.ring.pop_into(out))
    }

    fn available(&self) -> Option<usize> {
        Some(self.ring.available())
    }
}

/// Speaker playback; mono samples are copied to every channel.
pub struct CpalOutput {
    ring: SharedRing<f32>,
    sample_rate: f64,
    _stream: cpal::Stream,
}

impl CpalOutput {
    /// Opens `device` (fuzzy name match) or the default output at `sample_rate`.
    pub fn open(device: Option<&str>, sample_rate: f64) -> Result<Self> {
        let rate = whole_rate(sample_rate)?;
        let host = cpal::default_host();
        let device = find_device(&host, device, false)?;
        let channels = device
            .default_output_config()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .channels();

        let config = cpal::StreamConfig {
            channels,
            sample_rate: rate,
            buffer_size: cpal::BufferSize::Default,
        };
        let ring = SharedRing::with_capacity((sample_rate * RING_SECONDS) as usize);
        let consumer = ring.clone();
        let width = usize::from(channels.max(1));
        let mut mono = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / width, 0.0);
                    consumer.pull_or_zero(&mut mono);
                    for (frame, &sample) in data.chunks_mut(width).zip(&mono) {
                        frame.fill(sample);
                    }
                },
                move |err| tracing::error!(error = %err, "audio output stream error"),
                None,
            )
            .map_err(build_error)?;
        stream.play().map_err(|e| Error::Stream(e.to_string()))?;

        tracing::info!(
            device = device_name(&device).unwrap_or_default(),
            channels,
            sample_rate = rate,
            "audio output started"
        );
        Ok(Self {
            ring,
            sample_rate,
            _stream: stream,
        })
    }

    /// Callbacks that had to be padded with silence.
    pub fn underruns(&self) -> u64 {
        self.ring.underruns()
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn write(&mut self, samples: &[f32]) -> Result<usize> {
        Ok(self.ring.write(samples))
    }

    fn free(&self) -> Option<usize> {
        Some(self.ring.free())
    }

    fn finish(&mut self) -> Result<()> {
        tracing::info!(underruns = self.ring.underruns(), "audio output stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_rate_is_rejected_before_touching_hardware() {
        assert!(matches!(
            CpalOutput::open(None, 44_100.5),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(CpalInput::open(None, 0.0), Err(Error::Configuration(_))));
    }
}
