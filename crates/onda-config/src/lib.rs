//! Station presets for onda.
//!
//! A [`StationConfig`] names one topology (FM transmitter, FM receiver, tone
//! transceiver, or baseband tone) and every parameter it needs: rates, the
//! emphasis time constant, deviation, RF settings per radio. Presets are TOML
//! files; the classic USRP1 + RFX900 stations ship as factory presets.
//!
//! # Example
//!
//! ```rust,no_run
//! use onda_config::{StationConfig, get_factory_preset, user_presets_dir, validate_station};
//!
//! let mut preset = get_factory_preset("audio-fm-rx").unwrap();
//! preset.name = "night-watch".to_string();
//! preset.radio.center_freq = 916.5e6;
//! validate_station(&preset).unwrap();
//! preset.save(user_presets_dir().join("night-watch.toml")).unwrap();
//!
//! let chain = preset.rx_chain();
//! assert_eq!(chain.radio.center_freq, 916.5e6);
//! ```

mod chain;
mod error;
mod preset;

/// Platform-specific preset paths and preset resolution.
pub mod paths;

/// Preset validation.
pub mod validation;

/// Factory presets bundled with the library.
pub mod factory_presets;

pub use error::ConfigError;
pub use factory_presets::{
    FACTORY_PRESET_NAMES, factory_preset_names, factory_presets, get_factory_preset,
    is_factory_preset,
};
pub use paths::{
    ensure_user_presets_dir, find_preset, list_user_presets, preset_name_from_path,
    resolve_preset, user_config_dir, user_presets_dir,
};
pub use preset::{
    AudioSource, Mode, RadioConfig, RxConfig, SampleFormat, StationConfig, ToneConfig,
    TransceiveConfig, TxConfig, WindowName,
};
pub use validation::{ValidationError, ValidationResult, validate_for_device, validate_station};
