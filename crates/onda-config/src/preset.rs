//! Station preset file format and operations.

use std::fmt;
use std::path::{Path, PathBuf};

use onda_core::blocks::{BROADCAST_DEVIATION, DEFAULT_TAU};
use onda_io::{CpuFormat, Window};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which topology a preset drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// FM transmitter.
    #[default]
    Tx,
    /// FM receiver.
    Rx,
    /// Complex tone out of one radio, spectrum of the other.
    Transceive,
    /// Scaled real tone straight to the radio.
    Tone,
}

impl Mode {
    /// Lowercase name, as written in preset files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Tx => "tx",
            Mode::Rx => "rx",
            Mode::Transceive => "transceive",
            Mode::Tone => "tone",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host sample format, named the way radio drivers name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Complex float32.
    #[default]
    Fc32,
    /// Real float32.
    F32,
}

impl From<SampleFormat> for CpuFormat {
    fn from(format: SampleFormat) -> Self {
        match format {
            SampleFormat::Fc32 => CpuFormat::ComplexFloat,
            SampleFormat::F32 => CpuFormat::RealFloat,
        }
    }
}

/// Spectrum window name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowName {
    /// No tapering.
    Rectangular,
    /// Hamming.
    #[default]
    Hamming,
    /// 4-term Blackman-Harris.
    BlackmanHarris,
}

impl From<WindowName> for Window {
    fn from(name: WindowName) -> Self {
        match name {
            WindowName::Rectangular => Window::Rectangular,
            WindowName::Hamming => Window::Hamming,
            WindowName::BlackmanHarris => Window::BlackmanHarris,
        }
    }
}

/// Where the transmitter's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSource {
    /// Built-in test tone.
    #[default]
    Tone,
    /// Audio input device, falling back to the tone when none is present.
    Mic,
    /// WAV file named by `wav`.
    Wav,
}

/// RF front-end settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Center frequency in Hz.
    pub center_freq: f64,
    /// Gain in dB.
    pub gain: f64,
    /// Antenna port.
    pub antenna: String,
    /// Host sample format.
    pub cpu_format: SampleFormat,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            center_freq: 915e6,
            gain: 20.0,
            antenna: "TX/RX".to_string(),
            cpu_format: SampleFormat::Fc32,
        }
    }
}

/// FM transmitter section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxConfig {
    /// Audio rate in Hz.
    pub audio_rate: f64,
    /// Radio rate in Hz.
    pub quad_rate: f64,
    /// Resample audio to the quad rate before modulating.
    pub resample: bool,
    /// Pre-emphasis time constant in seconds.
    pub tau: f64,
    /// Deviation for full-scale audio, in Hz.
    pub max_deviation: f64,
    /// Test tone frequency in Hz.
    pub tone_freq: f64,
    /// Test tone amplitude.
    pub tone_amplitude: f32,
    /// Audio source.
    pub source: AudioSource,
    /// WAV file for [`AudioSource::Wav`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wav: Option<PathBuf>,
    /// Audio input device name; the host default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            audio_rate: 48_000.0,
            quad_rate: 480_000.0,
            resample: true,
            tau: DEFAULT_TAU,
            max_deviation: 5e3,
            tone_freq: 1_000.0,
            tone_amplitude: 0.5,
            source: AudioSource::Tone,
            wav: None,
            device: None,
        }
    }
}

/// FM receiver section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    /// Radio rate in Hz.
    pub quad_rate: f64,
    /// Decimation from the quad rate to the demodulated rate.
    pub audio_decimation: u32,
    /// Audio output rate in Hz.
    pub audio_rate: u32,
    /// Resample the demodulated audio when it differs from `audio_rate`.
    pub resample_audio: bool,
    /// De-emphasis time constant in seconds.
    pub tau: f64,
    /// Deviation that demodulates to full scale, in Hz.
    pub max_deviation: f64,
    /// Attach a spectrum tap to the radio output.
    pub spectrum: bool,
    /// Spectrum window.
    pub window: WindowName,
    /// Audio output device name; the host default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            quad_rate: 500_000.0,
            audio_decimation: 10,
            audio_rate: 50_000,
            resample_audio: false,
            tau: DEFAULT_TAU,
            max_deviation: BROADCAST_DEVIATION,
            spectrum: true,
            window: WindowName::Hamming,
            device: None,
        }
    }
}

/// Tone transceiver section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransceiveConfig {
    /// Radio rate for both directions, in Hz.
    pub sample_rate: f64,
    /// Tone offset from the carrier in Hz.
    pub tone_offset: f64,
    /// Tone amplitude.
    pub tone_amplitude: f32,
    /// Spectrum window.
    pub window: WindowName,
}

impl Default for TransceiveConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1e6,
            tone_offset: 100e3,
            tone_amplitude: 0.5,
            window: WindowName::BlackmanHarris,
        }
    }
}

/// Baseband tone section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Radio rate in Hz.
    pub sample_rate: f64,
    /// Tone frequency in Hz.
    pub tone_freq: f64,
    /// Tone amplitude before scaling.
    pub tone_amplitude: f32,
    /// Gain applied before the radio.
    pub scale: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: 500e3,
            tone_freq: 1_000.0,
            tone_amplitude: 1.0,
            scale: 0.5,
        }
    }
}

/// A complete station: which topology to build and every parameter it needs.
///
/// Only the section matching `mode` is read; absent sections take their
/// defaults.
///
/// # TOML Format
///
/// ```toml
/// name = "audio-fm-rx"
/// description = "Broadcast-deviation FM receiver"
/// mode = "rx"
///
/// [radio]
/// center_freq = 915e6
/// gain = 30.0
/// antenna = "TX/RX"
///
/// [rx]
/// quad_rate = 500000.0
/// audio_decimation = 10
/// audio_rate = 50000
/// window = "hamming"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Preset name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Topology to build.
    #[serde(default)]
    pub mode: Mode,

    /// Primary radio; the transmitting one in transceive mode.
    #[serde(default)]
    pub radio: RadioConfig,

    /// Receiving radio in transceive mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx_radio: Option<RadioConfig>,

    /// Transmitter parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<TxConfig>,

    /// Receiver parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rx: Option<RxConfig>,

    /// Transceiver parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transceive: Option<TransceiveConfig>,

    /// Baseband tone parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<ToneConfig>,
}

impl StationConfig {
    /// Creates a preset for `mode` with default parameters.
    pub fn new(name: impl Into<String>, mode: Mode) -> Self {
        Self {
            name: name.into(),
            description: None,
            mode,
            radio: RadioConfig::default(),
            rx_radio: None,
            tx: None,
            rx: None,
            transceive: None,
            tone: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the primary radio settings.
    pub fn with_radio(mut self, radio: RadioConfig) -> Self {
        self.radio = radio;
        self
    }

    /// Transmitter section, or its defaults.
    pub fn tx(&self) -> TxConfig {
        self.tx.clone().unwrap_or_default()
    }

    /// Receiver section, or its defaults.
    pub fn rx(&self) -> RxConfig {
        self.rx.clone().unwrap_or_default()
    }

    /// Transceiver section, or its defaults.
    pub fn transceive(&self) -> TransceiveConfig {
        self.transceive.clone().unwrap_or_default()
    }

    /// Baseband tone section, or its defaults.
    pub fn tone(&self) -> ToneConfig {
        self.tone.clone().unwrap_or_default()
    }

    /// Receiving radio for transceive mode.
    ///
    /// Defaults to the primary radio moved to the `RX2` port.
    pub fn rx_radio(&self) -> RadioConfig {
        self.rx_radio.clone().unwrap_or_else(|| RadioConfig {
            antenna: "RX2".to_string(),
            ..self.radio.clone()
        })
    }

    /// Sample rate the radio streams at for this mode.
    pub fn radio_rate(&self) -> f64 {
        match self.mode {
            Mode::Tx => self.tx().quad_rate,
            Mode::Rx => self.rx().quad_rate,
            Mode::Transceive => self.transceive().sample_rate,
            Mode::Tone => self.tone().sample_rate,
        }
    }

    /// Load a preset from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a preset from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the preset to a TOML file, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the preset to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_takes_defaults() {
        let preset = StationConfig::from_toml("name = \"bare\"").unwrap();
        assert_eq!(preset.mode, Mode::Tx);
        assert_eq!(preset.radio, RadioConfig::default());
        assert_eq!(preset.tx(), TxConfig::default());
        assert_eq!(preset.radio_rate(), 480_000.0);
    }

    #[test]
    fn partial_sections_fill_in() {
        let preset = StationConfig::from_toml(
            r#"
name = "rx"
mode = "rx"

[radio]
gain = 40.0

[rx]
audio_rate = 48000
resample_audio = true
window = "blackman-harris"
"#,
        )
        .unwrap();
        assert_eq!(preset.radio.gain, 40.0);
        assert_eq!(preset.radio.antenna, "TX/RX");
        let rx = preset.rx();
        assert_eq!(rx.quad_rate, 500_000.0);
        assert_eq!(rx.audio_rate, 48_000);
        assert!(rx.resample_audio);
        assert_eq!(rx.window, WindowName::BlackmanHarris);
        assert_eq!(preset.radio_rate(), 500_000.0);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = StationConfig::from_toml("name = \"x\"\nmode = \"duplex\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn to_toml_skips_unused_sections() {
        let mut preset = StationConfig::new("tone", Mode::Tone).with_description("test");
        preset.tone = Some(ToneConfig::default());
        let text = preset.to_toml().unwrap();
        assert!(text.contains("mode = \"tone\""));
        assert!(text.contains("[tone]"));
        assert!(!text.contains("[rx]"));
        assert!(!text.contains("rx_radio"));
        assert_eq!(StationConfig::from_toml(&text).unwrap(), preset);
    }

    #[test]
    fn rx_radio_defaults_to_rx2() {
        let preset = StationConfig::new("t", Mode::Transceive).with_radio(RadioConfig {
            gain: 30.0,
            ..RadioConfig::default()
        });
        let rx = preset.rx_radio();
        assert_eq!(rx.antenna, "RX2");
        assert_eq!(rx.gain, 30.0);
    }

    #[test]
    fn sample_format_names() {
        let radio: RadioConfig = toml::from_str("cpu_format = \"f32\"").unwrap();
        assert_eq!(CpuFormat::from(radio.cpu_format), CpuFormat::RealFloat);
        assert_eq!(Window::from(WindowName::default()), Window::Hamming);
    }
}
