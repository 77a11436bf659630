//! FM transmitter command.

use std::path::PathBuf;

use clap::Args;
use onda_config::Mode;
use onda_io::{AudioInput, CpalInput, SourceChoice, TxSource, fm_transmitter};

use super::common::{StationArgs, run_topology, simulated_radio};

#[derive(Args)]
pub struct TxArgs {
    #[command(flatten)]
    station: StationArgs,

    /// Modulate the audio input device, falling back to the test tone when none is present
    #[arg(long, conflicts_with = "wav")]
    mic: bool,

    /// Modulate a WAV file recorded at the preset's audio rate
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Audio input device name (partial match)
    #[arg(long)]
    input_device: Option<String>,
}

pub fn run(args: TxArgs) -> anyhow::Result<()> {
    let config = args.station.load("fm-tx-rx-usrp1-tx", Mode::Tx)?;
    let duration = args.station.duration()?;
    let mut chain = config.tx_chain()?;
    if args.mic {
        chain.source = TxSource::Microphone;
    } else if let Some(path) = args.wav {
        chain.source = TxSource::Wav(path);
    }

    let device = args.input_device.or(config.tx().device);
    let topology = fm_transmitter(&chain, Box::new(simulated_radio()), move |rate| {
        Ok(Box::new(CpalInput::open(device.as_deref(), rate)?) as Box<dyn AudioInput>)
    })?;

    let source = match topology.source {
        Some(SourceChoice::Device) => "audio input",
        _ => "test tone",
    };
    println!("FM transmitter '{}'", config.name);
    println!("  Source:    {source}");
    println!("  Audio:     {} Hz", chain.audio_rate);
    println!("  Quad rate: {} Hz", chain.quad_rate);
    println!("  Deviation: {} Hz", chain.max_deviation);
    println!("  Carrier:   {:.3} MHz, {} dB, {}", chain.radio.center_freq / 1e6, chain.radio.gain, chain.radio.antenna);

    run_topology(topology, duration)
}
