//! Mapping from presets to the topology parameter structs the station builders take.

use onda_io::{RadioParams, RxChain, ToneChain, TransceiveChain, TxChain, TxSource};

use crate::error::ConfigError;
use crate::preset::{AudioSource, RadioConfig, StationConfig};
use crate::validation::ValidationError;

impl From<&RadioConfig> for RadioParams {
    fn from(radio: &RadioConfig) -> Self {
        RadioParams {
            center_freq: radio.center_freq,
            gain: radio.gain,
            antenna: radio.antenna.clone(),
            cpu_format: radio.cpu_format.into(),
        }
    }
}

impl StationConfig {
    /// Transmitter chain for this preset.
    ///
    /// Fails if the audio source is a WAV file but no file is named.
    pub fn tx_chain(&self) -> Result<TxChain, ConfigError> {
        let tx = self.tx();
        let source = match tx.source {
            AudioSource::Tone => TxSource::Tone,
            AudioSource::Mic => TxSource::Microphone,
            AudioSource::Wav => TxSource::Wav(tx.wav.clone().ok_or_else(|| {
                ValidationError::Missing {
                    field: "tx.wav".into(),
                    reason: "source = \"wav\" needs a file".into(),
                }
            })?),
        };
        Ok(TxChain {
            audio_rate: tx.audio_rate,
            quad_rate: tx.quad_rate,
            resample: tx.resample,
            tau: tx.tau,
            max_deviation: tx.max_deviation,
            tone_freq: tx.tone_freq,
            tone_amplitude: tx.tone_amplitude,
            source,
            radio: RadioParams::from(&self.radio),
        })
    }

    /// Receiver chain for this preset.
    pub fn rx_chain(&self) -> RxChain {
        let rx = self.rx();
        RxChain {
            quad_rate: rx.quad_rate,
            audio_decimation: rx.audio_decimation,
            resample_audio: rx.resample_audio,
            tau: rx.tau,
            max_deviation: rx.max_deviation,
            spectrum: rx.spectrum.then(|| rx.window.into()),
            radio: RadioParams::from(&self.radio),
        }
    }

    /// Tone transceiver chain for this preset.
    pub fn transceive_chain(&self) -> TransceiveChain {
        let t = self.transceive();
        TransceiveChain {
            sample_rate: t.sample_rate,
            tone_offset: t.tone_offset,
            tone_amplitude: t.tone_amplitude,
            tx: RadioParams::from(&self.radio),
            rx: RadioParams::from(&self.rx_radio()),
            window: t.window.into(),
        }
    }

    /// Baseband tone chain for this preset.
    pub fn tone_chain(&self) -> ToneChain {
        let t = self.tone();
        ToneChain {
            sample_rate: t.sample_rate,
            tone_freq: t.tone_freq,
            tone_amplitude: t.tone_amplitude,
            scale: t.scale,
            radio: RadioParams::from(&self.radio),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{Mode, RxConfig, SampleFormat, TxConfig, WindowName};
    use onda_io::{CpuFormat, Window};

    #[test]
    fn tx_chain_carries_every_field() {
        let mut preset = StationConfig::new("tx", Mode::Tx).with_radio(RadioConfig {
            gain: 30.0,
            cpu_format: SampleFormat::F32,
            ..RadioConfig::default()
        });
        preset.tx = Some(TxConfig {
            audio_rate: 50_000.0,
            quad_rate: 500_000.0,
            resample: false,
            max_deviation: 75e3,
            source: AudioSource::Mic,
            ..TxConfig::default()
        });
        let chain = preset.tx_chain().unwrap();
        assert_eq!(chain.audio_rate, 50_000.0);
        assert_eq!(chain.quad_rate, 500_000.0);
        assert!(!chain.resample);
        assert_eq!(chain.max_deviation, 75e3);
        assert_eq!(chain.source, TxSource::Microphone);
        assert_eq!(chain.radio.gain, 30.0);
        assert_eq!(chain.radio.cpu_format, CpuFormat::RealFloat);
    }

    #[test]
    fn wav_source_needs_a_path() {
        let mut preset = StationConfig::new("tx", Mode::Tx);
        preset.tx = Some(TxConfig {
            source: AudioSource::Wav,
            ..TxConfig::default()
        });
        assert!(matches!(
            preset.tx_chain(),
            Err(ConfigError::Validation(ValidationError::Missing { .. }))
        ));

        preset.tx.as_mut().unwrap().wav = Some("speech.wav".into());
        assert_eq!(preset.tx_chain().unwrap().source, TxSource::Wav("speech.wav".into()));
    }

    #[test]
    fn rx_chain_spectrum_toggle() {
        let mut preset = StationConfig::new("rx", Mode::Rx);
        preset.rx = Some(RxConfig {
            window: WindowName::BlackmanHarris,
            ..RxConfig::default()
        });
        assert_eq!(preset.rx_chain().spectrum, Some(Window::BlackmanHarris));
        preset.rx.as_mut().unwrap().spectrum = false;
        assert_eq!(preset.rx_chain().spectrum, None);
        assert_eq!(preset.rx_chain().demod_rate(), 50_000.0);
    }

    #[test]
    fn transceive_uses_both_radios() {
        let preset = StationConfig::new("t", Mode::Transceive);
        let chain = preset.transceive_chain();
        assert_eq!(chain.tx.antenna, "TX/RX");
        assert_eq!(chain.rx.antenna, "RX2");
        assert_eq!(chain.window, Window::BlackmanHarris);
    }
}
