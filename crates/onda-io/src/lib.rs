//! Hardware boundary and lifecycle control for onda flowgraphs.
//!
//! This crate provides:
//!
//! - **Device endpoints**: [`DeviceEndpoint`] drives a [`RadioDriver`] from its own
//!   I/O thread, exchanges samples with the graph through a shared ring and
//!   accepts hot parameter changes through an [`EndpointHandle`]
//! - **Simulated hardware**: [`SimulatedRadio`] for offline runs and tests
//! - **Audio collaborators**: cpal microphone/speaker, WAV files, and the tone
//!   fallback used when no microphone is available
//! - **Lifecycle control**: [`Station`] owns a graph plus its endpoints and
//!   implements `start` / `stop` / `wait`
//! - **Topologies**: ready-made FM transmit, FM receive and tone transceive chains
//! - **Display taps**: [`SpectrumProbe`] and [`TimeProbe`] read-only views
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use onda_io::{DeviceCapabilities, SimulatedRadio, TxChain, fm_transmitter};
//!
//! let (radio, _probe) = SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900());
//! let tx = fm_transmitter(&TxChain::default(), Box::new(radio), |_| {
//!     Err(onda_io::Error::DeviceUnavailable("no microphone".into()))
//! })?;
//! tx.station.start()?;
//! tx.station.endpoint("tx").unwrap().set_center_freq(915.1e6)?;
//! tx.station.stop()?;
//! ```

pub mod audio;
pub mod device;
pub mod display;
pub mod endpoint;
pub mod sim;
pub mod station;
pub mod topology;
pub mod wav;

mod cpal_audio;

pub use audio::{
    AudioInput, AudioOutput, AudioSinkBlock, AudioSourceBlock, SourceChoice, open_source_or_tone,
};
pub use cpal_audio::{AudioDevice, CpalInput, CpalOutput, list_audio_devices};
pub use device::{
    CpuFormat, DeviceCapabilities, DeviceSettings, HotSettings, Interrupt, RadioDriver,
    StreamDirection,
};
pub use display::{SpectrumProbe, SpectrumSnapshot, TimeProbe, Window};
pub use endpoint::{DeviceEndpoint, EndpointHandle, RadioSink, RadioSource};
pub use sim::{AppliedSettings, SimProbe, SimSignal, SimulatedRadio};
pub use station::{EndpointStats, RunStats, State, Station, StopHandle};
pub use topology::{
    RadioParams, RxChain, ToneChain, Topology, TransceiveChain, TxChain, TxSource, baseband_tone,
    fm_receiver, fm_transmitter, tone_transceiver,
};
pub use wav::{WavInput, WavOutput, WavSpec, read_wav, write_wav};

use onda_core::GraphError;

/// Error types for the hardware boundary and lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid parameters, rejected before anything streams.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Graph construction or validation failure.
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// A device (radio, microphone, speaker) cannot be opened.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Hardware I/O failed while streaming.
    #[error("device failure: {0}")]
    Device(String),

    /// Audio stream setup or runtime error.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// WAV file read/write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Operation not allowed in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that leave a configured graph untouched and can be
    /// fixed by changing parameters.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::Graph(e) => e.is_configuration(),
            _ => false,
        }
    }
}

/// Convenience result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
