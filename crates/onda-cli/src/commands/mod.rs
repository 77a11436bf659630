//! CLI command implementations.

pub mod common;
pub mod devices;
pub mod presets;
pub mod rx;
pub mod tone;
pub mod transceive;
pub mod tx;
