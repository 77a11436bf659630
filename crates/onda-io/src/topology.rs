//! Ready-made station topologies.
//!
//! | Builder | Graph |
//! |---------|-------|
//! | [`fm_transmitter`] | audio (mic / WAV / tone) → [resampler] → WFM TX → radio |
//! | [`fm_receiver`] | radio → WFM RCV → [resampler] → audio, spectrum tap on the radio |
//! | [`tone_transceiver`] | complex tone → radio TX; radio RX → discard, spectrum + time taps |
//! | [`baseband_tone`] | real tone → ×gain → real→complex → radio |

use std::path::PathBuf;

use onda_core::blocks::{
    BROADCAST_DEVIATION, DEFAULT_TAU, FloatToComplex, MultiplyConst, NullSink, RationalResampler,
    ToneSource, WfmRcv, WfmTx,
};
use onda_core::{Complex32, FlowGraph};

use crate::audio::{AudioInput, AudioOutput, AudioSinkBlock, SourceChoice, open_source_or_tone};
use crate::device::{CpuFormat, DeviceSettings, RadioDriver};
use crate::display::{DEFAULT_FFT_SIZE, SpectrumProbe, TimeProbe, Window};
use crate::endpoint::DeviceEndpoint;
use crate::station::Station;
use crate::wav::WavInput;
use crate::{Error, Result};

/// Samples kept by the time-domain tap.
const TIME_TAP_SIZE: usize = 1024;

/// RF front-end parameters shared by every topology.
#[derive(Debug, Clone, PartialEq)]
pub struct RadioParams {
    /// RF center frequency in Hz.
    pub center_freq: f64,
    /// Gain in dB.
    pub gain: f64,
    /// Antenna port.
    pub antenna: String,
    /// Host sample format.
    pub cpu_format: CpuFormat,
}

impl Default for RadioParams {
    fn default() -> Self {
        Self {
            center_freq: 915e6,
            gain: 20.0,
            antenna: "TX/RX".to_string(),
            cpu_format: CpuFormat::ComplexFloat,
        }
    }
}

impl RadioParams {
    fn settings(&self, sample_rate: f64) -> DeviceSettings {
        DeviceSettings {
            sample_rate,
            center_freq: self.center_freq,
            gain: self.gain,
            antenna: self.antenna.clone(),
            cpu_format: self.cpu_format,
        }
    }
}

/// Audio feeding the FM transmitter.
#[derive(Debug, Clone, PartialEq)]
pub enum TxSource {
    /// A test tone.
    Tone,
    /// A live microphone, falling back to the tone when unavailable.
    Microphone,
    /// A WAV file at the chain's audio rate.
    Wav(PathBuf),
}

/// FM transmitter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TxChain {
    /// Audio sample rate in Hz.
    pub audio_rate: f64,
    /// Radio sample rate in Hz; an integer multiple of `audio_rate`.
    pub quad_rate: f64,
    /// Interpolate with a separate rational resampler before the modulator
    /// instead of inside it.
    pub resample: bool,
    /// Pre-emphasis time constant in seconds.
    pub tau: f64,
    /// Peak deviation in Hz for full-scale audio.
    pub max_deviation: f64,
    /// Tone frequency for the test tone and the fallback.
    pub tone_freq: f64,
    /// Tone amplitude.
    pub tone_amplitude: f32,
    /// Audio source.
    pub source: TxSource,
    /// RF parameters.
    pub radio: RadioParams,
}

impl Default for TxChain {
    fn default() -> Self {
        Self {
            audio_rate: 48_000.0,
            quad_rate: 480_000.0,
            resample: true,
            tau: DEFAULT_TAU,
            max_deviation: 5e3,
            tone_freq: 1_000.0,
            tone_amplitude: 0.5,
            source: TxSource::Tone,
            radio: RadioParams::default(),
        }
    }
}

/// FM receiver parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RxChain {
    /// Radio sample rate in Hz.
    pub quad_rate: f64,
    /// Decimation from `quad_rate` to the demodulated audio rate.
    pub audio_decimation: u32,
    /// Bridge the demodulated rate to the audio output's rate with a
    /// rational resampler when they differ.
    pub resample_audio: bool,
    /// De-emphasis time constant in seconds.
    pub tau: f64,
    /// Deviation that demodulates to full scale.
    pub max_deviation: f64,
    /// Window of the spectrum tap, or `None` for no tap.
    pub spectrum: Option<Window>,
    /// RF parameters.
    pub radio: RadioParams,
}

impl Default for RxChain {
    fn default() -> Self {
        Self {
            quad_rate: 500_000.0,
            audio_decimation: 10,
            resample_audio: false,
            tau: DEFAULT_TAU,
            max_deviation: BROADCAST_DEVIATION,
            spectrum: Some(Window::Hamming),
            radio: RadioParams {
                gain: 40.0,
                ..RadioParams::default()
            },
        }
    }
}

impl RxChain {
    /// Rate produced by the demodulator.
    pub fn demod_rate(&self) -> f64 {
        self.quad_rate / f64::from(self.audio_decimation.max(1))
    }
}

/// Tone transceive parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TransceiveChain {
    /// Sample rate of both directions in Hz.
    pub sample_rate: f64,
    /// Offset of the transmitted complex tone in Hz.
    pub tone_offset: f64,
    /// Tone amplitude.
    pub tone_amplitude: f32,
    /// Transmit front end.
    pub tx: RadioParams,
    /// Receive front end.
    pub rx: RadioParams,
    /// Window of the received-spectrum tap.
    pub window: Window,
}

impl Default for TransceiveChain {
    fn default() -> Self {
        Self {
            sample_rate: 1e6,
            tone_offset: 100e3,
            tone_amplitude: 0.5,
            tx: RadioParams {
                gain: 30.0,
                ..RadioParams::default()
            },
            rx: RadioParams {
                gain: 30.0,
                antenna: "RX2".to_string(),
                ..RadioParams::default()
            },
            window: Window::BlackmanHarris,
        }
    }
}

/// Baseband tone transmitter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneChain {
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Tone frequency in Hz.
    pub tone_freq: f64,
    /// Amplitude of the generated tone, before scaling.
    pub tone_amplitude: f32,
    /// Scale applied before conversion to complex.
    pub scale: f32,
    /// RF parameters.
    pub radio: RadioParams,
}

impl Default for ToneChain {
    fn default() -> Self {
        Self {
            sample_rate: 500e3,
            tone_freq: 1e3,
            tone_amplitude: 1.0,
            scale: 0.5,
            radio: RadioParams::default(),
        }
    }
}

/// A configured station and its optional displays.
#[derive(Debug)]
pub struct Topology {
    /// The station, in the `Configured` state.
    pub station: Station,
    /// Which audio source the transmitter ended up with.
    pub source: Option<SourceChoice>,
    /// Spectrum display probe.
    pub spectrum: Option<SpectrumProbe>,
    /// Time-domain display probe.
    pub scope: Option<TimeProbe>,
}

impl Topology {
    fn new(station: Station) -> Self {
        Self {
            station,
            source: None,
            spectrum: None,
            scope: None,
        }
    }
}

/// Builds the FM transmitter.
///
/// `open_mic` is only called for [`TxSource::Microphone`]; returning
/// [`Error::DeviceUnavailable`] from it switches to the test tone.
pub fn fm_transmitter<F>(chain: &TxChain, driver: Box<dyn RadioDriver>, open_mic: F) -> Result<Topology>
where
    F: FnOnce(f64) -> Result<Box<dyn AudioInput>>,
{
    let endpoint = DeviceEndpoint::sink("tx", driver, chain.radio.settings(chain.quad_rate))?;
    let mut graph = FlowGraph::new();

    let (source, choice) = match &chain.source {
        TxSource::Tone => (
            Box::new(ToneSource::real(chain.audio_rate, chain.tone_freq, chain.tone_amplitude))
                as Box<dyn onda_core::Block>,
            SourceChoice::Tone,
        ),
        TxSource::Microphone => {
            open_source_or_tone(open_mic, chain.audio_rate, chain.tone_freq, chain.tone_amplitude)?
        }
        TxSource::Wav(path) => open_source_or_tone(
            |_| Ok(Box::new(WavInput::open(path)?) as Box<dyn AudioInput>),
            chain.audio_rate,
            chain.tone_freq,
            chain.tone_amplitude,
        )?,
    };
    let mut upstream = graph.add_boxed(source);

    let modulator = if chain.resample {
        let interp = graph.add_block(RationalResampler::<f32>::for_rates(
            chain.audio_rate,
            chain.quad_rate,
        )?);
        graph.connect(upstream.output(0), interp.input(0))?;
        upstream = interp;
        WfmTx::new(chain.quad_rate, chain.quad_rate, chain.tau, chain.max_deviation)?
    } else {
        WfmTx::new(chain.audio_rate, chain.quad_rate, chain.tau, chain.max_deviation)?
    };
    let modulator = graph.add_block(modulator);
    let sink = graph.add_block(endpoint.sink_block()?);
    graph.connect(upstream.output(0), modulator.input(0))?;
    graph.connect(modulator.output(0), sink.input(0))?;

    tracing::debug!(
        audio_rate = chain.audio_rate,
        quad_rate = chain.quad_rate,
        max_dev = chain.max_deviation,
        source = ?choice,
        "fm transmitter built"
    );
    let mut topology = Topology::new(Station::configure(graph, vec![endpoint]));
    topology.source = Some(choice);
    Ok(topology)
}

/// Builds the FM receiver, playing into `output`.
pub fn fm_receiver(
    chain: &RxChain,
    driver: Box<dyn RadioDriver>,
    output: Box<dyn AudioOutput>,
) -> Result<Topology> {
    let endpoint = DeviceEndpoint::source("rx", driver, chain.radio.settings(chain.quad_rate))?;
    let mut graph = FlowGraph::new();
    let output_rate = output.sample_rate();

    let radio = graph.add_block(endpoint.source_block()?);
    let demod = graph.add_block(WfmRcv::with_params(
        chain.quad_rate,
        chain.audio_decimation,
        chain.max_deviation,
        chain.tau,
    )?);
    let sink = graph.add_block(AudioSinkBlock::new(output));
    graph.connect(radio.output(0), demod.input(0))?;

    let demod_rate = chain.demod_rate();
    if chain.resample_audio && (demod_rate - output_rate).abs() > 1e-6 * output_rate {
        let bridge = graph.add_block(RationalResampler::<f32>::for_rates(demod_rate, output_rate)?);
        graph.connect(demod.output(0), bridge.input(0))?;
        graph.connect(bridge.output(0), sink.input(0))?;
    } else {
        graph.connect(demod.output(0), sink.input(0))?;
    }

    let spectrum = match chain.spectrum {
        Some(window) => {
            let tap = graph.tap(radio.output(0), DEFAULT_FFT_SIZE)?;
            Some(SpectrumProbe::new(
                tap,
                DEFAULT_FFT_SIZE,
                window,
                chain.quad_rate,
                chain.radio.center_freq,
            ))
        }
        None => None,
    };

    let mut topology = Topology::new(Station::configure(graph, vec![endpoint]));
    topology.spectrum = spectrum;
    Ok(topology)
}

/// Builds the tone transceiver: a complex tone on one endpoint while the other
/// receives into display taps.
pub fn tone_transceiver(
    chain: &TransceiveChain,
    tx_driver: Box<dyn RadioDriver>,
    rx_driver: Box<dyn RadioDriver>,
) -> Result<Topology> {
    let tx = DeviceEndpoint::sink("tx", tx_driver, chain.tx.settings(chain.sample_rate))?;
    let rx = DeviceEndpoint::source("rx", rx_driver, chain.rx.settings(chain.sample_rate))?;
    let mut graph = FlowGraph::new();

    let tone = graph.add_block(ToneSource::complex(
        chain.sample_rate,
        chain.tone_offset,
        chain.tone_amplitude,
    ));
    let radio_out = graph.add_block(tx.sink_block()?);
    graph.connect(tone.output(0), radio_out.input(0))?;

    let radio_in = graph.add_block(rx.source_block()?);
    let discard = graph.add_block(NullSink::<Complex32>::new());
    graph.connect(radio_in.output(0), discard.input(0))?;

    let spectrum = SpectrumProbe::new(
        graph.tap(radio_in.output(0), DEFAULT_FFT_SIZE)?,
        DEFAULT_FFT_SIZE,
        chain.window,
        chain.sample_rate,
        chain.rx.center_freq,
    );
    let scope = TimeProbe::new(graph.tap(radio_in.output(0), TIME_TAP_SIZE)?, TIME_TAP_SIZE);

    let mut topology = Topology::new(Station::configure(graph, vec![tx, rx]));
    topology.spectrum = Some(spectrum);
    topology.scope = Some(scope);
    Ok(topology)
}

/// Builds the baseband tone transmitter.
pub fn baseband_tone(chain: &ToneChain, driver: Box<dyn RadioDriver>) -> Result<Topology> {
    if !chain.scale.is_finite() {
        return Err(Error::Configuration(format!("scale {} must be finite", chain.scale)));
    }
    let endpoint = DeviceEndpoint::sink("tx", driver, chain.radio.settings(chain.sample_rate))?;
    let mut graph = FlowGraph::new();

    let tone = graph.add_block(ToneSource::real(
        chain.sample_rate,
        chain.tone_freq,
        chain.tone_amplitude,
    ));
    let scale = graph.add_block(MultiplyConst::<f32>::new(chain.scale));
    let to_complex = graph.add_block(FloatToComplex::new());
    let sink = graph.add_block(endpoint.sink_block()?);
    graph.connect(tone.output(0), scale.input(0))?;
    graph.connect(scale.output(0), to_complex.input(0))?;
    graph.connect(to_complex.output(0), sink.input(0))?;

    Ok(Topology::new(Station::configure(graph, vec![endpoint])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceCapabilities;
    use crate::sim::SimulatedRadio;
    use crate::wav::WavOutput;

    fn radio() -> Box<dyn RadioDriver> {
        Box::new(SimulatedRadio::new(DeviceCapabilities::usrp1_rfx900()).0)
    }

    #[test]
    fn default_tx_chain_validates() {
        let topology = fm_transmitter(&TxChain::default(), radio(), |_| unreachable!()).unwrap();
        assert_eq!(topology.source, Some(SourceChoice::Tone));
        topology.station.stop().unwrap();
    }

    #[test]
    fn missing_microphone_falls_back() {
        let chain = TxChain {
            source: TxSource::Microphone,
            ..TxChain::default()
        };
        let topology = fm_transmitter(&chain, radio(), |_| {
            Err(Error::DeviceUnavailable("hw:0,0".into()))
        })
        .unwrap();
        assert_eq!(topology.source, Some(SourceChoice::Tone));
    }

    #[test]
    fn non_integer_interpolation_is_rejected() {
        let chain = TxChain {
            resample: false,
            audio_rate: 44_100.0,
            ..TxChain::default()
        };
        let err = fm_transmitter(&chain, radio(), |_| unreachable!()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn out_of_band_frequency_is_rejected() {
        let chain = TxChain {
            radio: RadioParams {
                center_freq: 2.4e9,
                ..RadioParams::default()
            },
            ..TxChain::default()
        };
        assert!(fm_transmitter(&chain, radio(), |_| unreachable!()).is_err());
    }

    #[test]
    fn receiver_bridges_50k_to_48k() {
        let dir = tempfile::tempdir().unwrap();
        let output = WavOutput::create(dir.path().join("rx.wav"), 48_000, 16).unwrap();
        let chain = RxChain {
            resample_audio: true,
            ..RxChain::default()
        };
        let topology = fm_receiver(&chain, radio(), Box::new(output)).unwrap();
        assert!(topology.spectrum.is_some());
        topology.station.start().unwrap();
        topology.station.stop().unwrap();
    }

    #[test]
    fn receiver_without_bridge_rejects_48k_sink() {
        let dir = tempfile::tempdir().unwrap();
        let output = WavOutput::create(dir.path().join("rx.wav"), 48_000, 16).unwrap();
        let topology = fm_receiver(&RxChain::default(), radio(), Box::new(output)).unwrap();
        let err = topology.station.start().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("rate mismatch"));
    }

    #[test]
    fn baseband_tone_builds() {
        let topology = baseband_tone(&ToneChain::default(), radio()).unwrap();
        topology.station.start().unwrap();
        topology.station.stop().unwrap();
    }
}
