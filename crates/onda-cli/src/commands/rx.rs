//! FM receiver command.

use std::path::PathBuf;

use clap::Args;
use onda_config::Mode;
use onda_io::{AudioOutput, CpalOutput, SimSignal, WavOutput, fm_receiver};

use super::common::{StationArgs, run_topology, simulated_radio};

/// Test tone heard by the simulated radio with `--test-signal`.
const TEST_TONE_HZ: f64 = 1_000.0;

#[derive(Args)]
pub struct RxArgs {
    #[command(flatten)]
    station: StationArgs,

    /// Write demodulated audio to a WAV file instead of playing it
    #[arg(long)]
    wav_out: Option<PathBuf>,

    /// Audio output device name (partial match)
    #[arg(long)]
    output_device: Option<String>,

    /// Have the simulated radio hear a 1 kHz tone at half the preset's deviation
    #[arg(long)]
    test_signal: bool,
}

pub fn run(args: RxArgs) -> anyhow::Result<()> {
    let config = args.station.load("fm-tx-rx-usrp1-rx", Mode::Rx)?;
    let duration = args.station.duration()?;
    let rx = config.rx();
    let chain = config.rx_chain();

    let output: Box<dyn AudioOutput> = match &args.wav_out {
        Some(path) => Box::new(WavOutput::create(path, rx.audio_rate, 16)?),
        None => {
            let device = args.output_device.or(rx.device.clone());
            Box::new(CpalOutput::open(device.as_deref(), f64::from(rx.audio_rate))?)
        }
    };

    let mut radio = simulated_radio();
    if args.test_signal {
        radio = radio.with_signal(SimSignal::FmTone {
            audio_freq: TEST_TONE_HZ,
            deviation: rx.max_deviation / 2.0,
            amplitude: 1.0,
        });
    }
    let topology = fm_receiver(&chain, Box::new(radio), output)?;

    println!("FM receiver '{}'", config.name);
    println!("  Quad rate: {} Hz / {}", chain.quad_rate, chain.audio_decimation);
    println!("  Audio:     {} Hz{}", rx.audio_rate, if chain.resample_audio { " (resampled)" } else { "" });
    println!("  Carrier:   {:.3} MHz, {} dB, {}", chain.radio.center_freq / 1e6, chain.radio.gain, chain.radio.antenna);
    if let Some(path) = &args.wav_out {
        println!("  Output:    {}", path.display());
    }

    run_topology(topology, duration)
}
