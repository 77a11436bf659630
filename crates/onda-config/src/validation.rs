//! Station preset validation.
//!
//! [`validate_station`] checks that a preset describes a buildable graph:
//! positive finite rates, rate relations the modulator and demodulator can
//! satisfy, and sane tone and deviation parameters. [`validate_for_device`]
//! additionally checks the radio settings against a device's capabilities.
//! Both collect every problem rather than stopping at the first one.
//!
//! # Example
//!
//! ```rust
//! use onda_config::{get_factory_preset, validate_station};
//!
//! let preset = get_factory_preset("audio-fm-rx").unwrap();
//! validate_station(&preset).expect("factory presets are valid");
//! ```

use onda_io::{DeviceCapabilities, DeviceSettings, StreamDirection};
use thiserror::Error;

use crate::preset::{AudioSource, Mode, RadioConfig, StationConfig};

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A rate, frequency, or deviation that must be positive is not.
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive {
        /// Dotted field path.
        field: String,
        /// Offending value.
        value: f64,
    },

    /// Value outside its allowed range.
    #[error("{field} value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Dotted field path.
        field: String,
        /// Offending value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },

    /// Two rates that must be related by an integer factor are not.
    #[error("{field}: {high} Hz is not an integer multiple of {low} Hz")]
    NotMultiple {
        /// Dotted field path.
        field: String,
        /// Higher rate.
        high: f64,
        /// Lower rate.
        low: f64,
    },

    /// The demodulated rate differs from the audio rate and no resampling is enabled.
    #[error("rx: demodulated rate {demod} Hz does not match audio_rate {audio} Hz (set resample_audio)")]
    RateMismatch {
        /// Quad rate over decimation.
        demod: f64,
        /// Requested audio rate.
        audio: f64,
    },

    /// A required value is absent.
    #[error("{field} is required: {reason}")]
    Missing {
        /// Dotted field path.
        field: String,
        /// Why it is needed.
        reason: String,
    },

    /// The radio cannot be set up as configured.
    #[error("{field}: {reason}")]
    Device {
        /// Which radio section.
        field: String,
        /// Capability check message.
        reason: String,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

#[derive(Default)]
struct Checker {
    errors: Vec<ValidationError>,
}

impl Checker {
    fn positive(&mut self, field: &str, value: f64) -> bool {
        if value > 0.0 && value.is_finite() {
            return true;
        }
        self.errors.push(ValidationError::NotPositive {
            field: field.to_string(),
            value,
        });
        false
    }

    fn range(&mut self, field: &str, value: f64, min: f64, max: f64) {
        if !(value.is_finite() && (min..=max).contains(&value)) {
            self.errors.push(ValidationError::OutOfRange {
                field: field.to_string(),
                value,
                min,
                max,
            });
        }
    }

    fn whole(&mut self, field: &str, value: f64) {
        if value.fract() != 0.0 {
            self.errors.push(ValidationError::OutOfRange {
                field: field.to_string(),
                value,
                min: 1.0,
                max: f64::from(u32::MAX),
            });
        }
    }

    fn multiple(&mut self, field: &str, high: f64, low: f64) {
        let factor = high / low;
        if factor < 1.0 || (factor - factor.round()).abs() > 1e-9 {
            self.errors.push(ValidationError::NotMultiple {
                field: field.to_string(),
                high,
                low,
            });
        }
    }

    fn finish(mut self) -> ValidationResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(ValidationError::Multiple(self.errors)),
        }
    }
}

/// Checks that `config` describes a buildable station.
pub fn validate_station(config: &StationConfig) -> ValidationResult<()> {
    let mut c = Checker::default();
    match config.mode {
        Mode::Tx => check_tx(config, &mut c),
        Mode::Rx => check_rx(config, &mut c),
        Mode::Transceive => {
            let t = config.transceive();
            if c.positive("transceive.sample_rate", t.sample_rate) {
                let nyquist = t.sample_rate / 2.0;
                c.range("transceive.tone_offset", t.tone_offset, -nyquist, nyquist);
            }
            c.range("transceive.tone_amplitude", f64::from(t.tone_amplitude), 0.0, 1.0);
        }
        Mode::Tone => {
            let t = config.tone();
            if c.positive("tone.sample_rate", t.sample_rate) {
                c.range("tone.tone_freq", t.tone_freq, 0.0, t.sample_rate / 2.0);
            }
            c.range("tone.tone_amplitude", f64::from(t.tone_amplitude), 0.0, 1.0);
            c.range("tone.scale", f64::from(t.scale), -1e3, 1e3);
        }
    }
    c.finish()
}

fn check_tx(config: &StationConfig, c: &mut Checker) {
    let tx = config.tx();
    let audio_ok = c.positive("tx.audio_rate", tx.audio_rate);
    let quad_ok = c.positive("tx.quad_rate", tx.quad_rate);
    if audio_ok && quad_ok {
        if tx.resample {
            c.whole("tx.audio_rate", tx.audio_rate);
            c.whole("tx.quad_rate", tx.quad_rate);
        } else {
            c.multiple("tx.quad_rate", tx.quad_rate, tx.audio_rate);
        }
    }
    if c.positive("tx.max_deviation", tx.max_deviation) && quad_ok {
        c.range("tx.max_deviation", tx.max_deviation, 0.0, tx.quad_rate / 2.0);
    }
    c.range("tx.tau", tx.tau, 0.0, 1e-3);
    if audio_ok {
        c.range("tx.tone_freq", tx.tone_freq, 0.0, tx.audio_rate / 2.0);
    }
    c.range("tx.tone_amplitude", f64::from(tx.tone_amplitude), 0.0, 1.0);
    if tx.source == AudioSource::Wav && tx.wav.is_none() {
        c.errors.push(ValidationError::Missing {
            field: "tx.wav".into(),
            reason: "source = \"wav\" needs a file".into(),
        });
    }
}

fn check_rx(config: &StationConfig, c: &mut Checker) {
    let rx = config.rx();
    let quad_ok = c.positive("rx.quad_rate", rx.quad_rate);
    if rx.audio_decimation == 0 {
        c.errors.push(ValidationError::OutOfRange {
            field: "rx.audio_decimation".into(),
            value: 0.0,
            min: 1.0,
            max: f64::from(u32::MAX),
        });
    }
    let audio_ok = c.positive("rx.audio_rate", f64::from(rx.audio_rate));
    if quad_ok && audio_ok && rx.audio_decimation > 0 {
        let demod = rx.quad_rate / f64::from(rx.audio_decimation);
        let audio = f64::from(rx.audio_rate);
        if rx.resample_audio {
            c.whole("rx.quad_rate / rx.audio_decimation", demod);
        } else if (demod - audio).abs() > 1e-6 * audio {
            c.errors.push(ValidationError::RateMismatch { demod, audio });
        }
    }
    if c.positive("rx.max_deviation", rx.max_deviation) && quad_ok {
        c.range("rx.max_deviation", rx.max_deviation, 0.0, rx.quad_rate / 2.0);
    }
    c.range("rx.tau", rx.tau, 0.0, 1e-3);
}

/// Runs [`validate_station`] and then checks every radio the station opens
/// against `caps`.
pub fn validate_for_device(config: &StationConfig, caps: &DeviceCapabilities) -> ValidationResult<()> {
    let mut c = Checker::default();
    if let Err(err) = validate_station(config) {
        match err {
            ValidationError::Multiple(errors) => c.errors.extend(errors),
            other => c.errors.push(other),
        }
    }
    let rate = config.radio_rate();
    let radios: Vec<(&str, StreamDirection, RadioConfig)> = match config.mode {
        Mode::Tx | Mode::Tone => vec![("radio", StreamDirection::Transmit, config.radio.clone())],
        Mode::Rx => vec![("radio", StreamDirection::Receive, config.radio.clone())],
        Mode::Transceive => vec![
            ("radio", StreamDirection::Transmit, config.radio.clone()),
            ("rx_radio", StreamDirection::Receive, config.rx_radio()),
        ],
    };
    for (field, direction, radio) in radios {
        let settings = DeviceSettings {
            sample_rate: rate,
            center_freq: radio.center_freq,
            gain: radio.gain,
            antenna: radio.antenna,
            cpu_format: radio.cpu_format.into(),
        };
        if let Err(err) = caps.check(direction, &settings) {
            c.errors.push(ValidationError::Device {
                field: field.to_string(),
                reason: err.to_string(),
            });
        }
    }
    c.finish()
}
