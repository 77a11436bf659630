//! Factory station presets.
//!
//! Each preset reproduces one classic USRP1 + RFX900 station and is embedded
//! at compile time, so it is available without any files on disk.

use crate::StationConfig;

/// Names of the factory presets, in listing order.
pub static FACTORY_PRESET_NAMES: &[&str] = &[
    "fm-tx-rx-usrp1-tx",
    "fm-tx-rx-usrp1-rx",
    "fm-tx-usrp1-rfx900",
    "audio-fm-tx",
    "audio-fm-rx",
    "transceive",
];

static FACTORY_PRESETS_TOML: &[(&str, &str)] = &[
    ("fm-tx-rx-usrp1-tx", FM_TX_RX_TX),
    ("fm-tx-rx-usrp1-rx", FM_TX_RX_RX),
    ("fm-tx-usrp1-rfx900", FM_TX_RFX900),
    ("audio-fm-tx", AUDIO_FM_TX),
    ("audio-fm-rx", AUDIO_FM_RX),
    ("transceive", TRANSCEIVE),
];

/// Narrowband FM transmitter: 48 kHz audio resampled to 480 kHz, 5 kHz deviation.
const FM_TX_RX_TX: &str = r#"
name = "fm-tx-rx-usrp1-tx"
description = "FM transmitter, 48 kHz audio resampled to 480 kHz, 5 kHz deviation"
mode = "tx"

[radio]
center_freq = 915e6
gain = 20.0
antenna = "TX/RX"
cpu_format = "fc32"

[tx]
audio_rate = 48000.0
quad_rate = 480000.0
resample = true
tau = 75e-6
max_deviation = 5000.0
tone_freq = 1000.0
tone_amplitude = 0.5
source = "tone"
"#;

/// Receiver paired with the transmitter above; 50 kHz demodulated audio bridged to 48 kHz.
const FM_TX_RX_RX: &str = r#"
name = "fm-tx-rx-usrp1-rx"
description = "FM receiver at 500 kHz, demodulated to 50 kHz and resampled to 48 kHz"
mode = "rx"

[radio]
center_freq = 915e6
gain = 40.0
antenna = "TX/RX"
cpu_format = "fc32"

[rx]
quad_rate = 500000.0
audio_decimation = 10
audio_rate = 48000
resample_audio = true
tau = 75e-6
max_deviation = 75000.0
spectrum = false
"#;

/// Unmodulated baseband test tone.
const FM_TX_RFX900: &str = r#"
name = "fm-tx-usrp1-rfx900"
description = "1 kHz tone scaled by 0.5 as real baseband at 500 kHz"
mode = "tone"

[radio]
center_freq = 915e6
gain = 20.0
antenna = "TX/RX"
cpu_format = "fc32"

[tone]
sample_rate = 500000.0
tone_freq = 1000.0
tone_amplitude = 1.0
scale = 0.5
"#;

/// Broadcast-deviation transmitter without a separate resampler.
const AUDIO_FM_TX: &str = r#"
name = "audio-fm-tx"
description = "Broadcast-deviation FM tone, 50 kHz audio modulated straight to 500 kHz"
mode = "tx"

[radio]
center_freq = 915e6
gain = 30.0
antenna = "TX/RX"
cpu_format = "fc32"

[tx]
audio_rate = 50000.0
quad_rate = 500000.0
resample = false
tau = 75e-6
max_deviation = 75000.0
tone_freq = 1000.0
tone_amplitude = 0.5
source = "tone"
"#;

/// Broadcast-deviation receiver with a spectrum display.
const AUDIO_FM_RX: &str = r#"
name = "audio-fm-rx"
description = "Broadcast-deviation FM receiver, 500 kHz to 50 kHz audio, Hamming spectrum"
mode = "rx"

[radio]
center_freq = 915e6
gain = 30.0
antenna = "TX/RX"
cpu_format = "fc32"

[rx]
quad_rate = 500000.0
audio_decimation = 10
audio_rate = 50000
resample_audio = false
tau = 75e-6
max_deviation = 75000.0
spectrum = true
window = "hamming"
"#;

/// Full-duplex tone check.
const TRANSCEIVE: &str = r#"
name = "transceive"
description = "100 kHz complex tone out of TX/RX, received spectrum on RX2"
mode = "transceive"

[radio]
center_freq = 915e6
gain = 30.0
antenna = "TX/RX"
cpu_format = "fc32"

[rx_radio]
center_freq = 915e6
gain = 30.0
antenna = "RX2"
cpu_format = "fc32"

[transceive]
sample_rate = 1e6
tone_offset = 100e3
tone_amplitude = 0.5
window = "blackman-harris"
"#;

/// All factory presets, parsed.
pub fn factory_presets() -> Vec<StationConfig> {
    FACTORY_PRESETS_TOML
        .iter()
        .filter_map(|(_, toml)| StationConfig::from_toml(toml).ok())
        .collect()
}

/// Factory preset by name, case-insensitive.
pub fn get_factory_preset(name: &str) -> Option<StationConfig> {
    FACTORY_PRESETS_TOML
        .iter()
        .find(|(preset_name, _)| preset_name.eq_ignore_ascii_case(name))
        .and_then(|(_, toml)| StationConfig::from_toml(toml).ok())
}

/// Factory preset names.
pub fn factory_preset_names() -> Vec<&'static str> {
    FACTORY_PRESETS_TOML.iter().map(|(name, _)| *name).collect()
}

/// Whether `name` is a factory preset.
pub fn is_factory_preset(name: &str) -> bool {
    FACTORY_PRESET_NAMES
        .iter()
        .any(|preset_name| preset_name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{AudioSource, Mode, WindowName};
    use crate::validation::validate_station;

    #[test]
    fn every_factory_preset_parses_and_validates() {
        for (name, toml) in FACTORY_PRESETS_TOML {
            let preset = StationConfig::from_toml(toml)
                .unwrap_or_else(|e| panic!("factory preset '{name}' failed to parse: {e}"));
            assert_eq!(preset.name, *name);
            assert!(preset.description.is_some());
            validate_station(&preset)
                .unwrap_or_else(|e| panic!("factory preset '{name}' is invalid: {e}"));
        }
        assert_eq!(factory_presets().len(), FACTORY_PRESET_NAMES.len());
    }

    #[test]
    fn names_table_matches_embedded_presets() {
        assert_eq!(factory_preset_names(), FACTORY_PRESET_NAMES.to_vec());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(is_factory_preset("Audio-FM-RX"));
        assert!(!is_factory_preset("fm-duplex"));
        let preset = get_factory_preset("TRANSCEIVE").unwrap();
        assert_eq!(preset.mode, Mode::Transceive);
        assert_eq!(preset.rx_radio().antenna, "RX2");
        assert_eq!(preset.transceive().window, WindowName::BlackmanHarris);
        assert!(get_factory_preset("nope").is_none());
    }

    #[test]
    fn paired_presets_share_a_frequency() {
        let tx = get_factory_preset("fm-tx-rx-usrp1-tx").unwrap();
        let rx = get_factory_preset("fm-tx-rx-usrp1-rx").unwrap();
        assert_eq!(tx.radio.center_freq, rx.radio.center_freq);
        assert_eq!(tx.tx().source, AudioSource::Tone);
        assert!(rx.rx().resample_audio);
    }
}
