//! Tone transceiver command.

use clap::Args;
use onda_config::Mode;
use onda_io::{SimulatedRadio, tone_transceiver};
use tracing::info;

use super::common::{StationArgs, reference_radio, run_topology};

/// Samples the simulated air can hold between the two radios.
const AIR_CAPACITY: usize = 1 << 18;

#[derive(Args)]
pub struct TransceiveArgs {
    #[command(flatten)]
    station: StationArgs,
}

pub fn run(args: TransceiveArgs) -> anyhow::Result<()> {
    let config = args.station.load("transceive", Mode::Transceive)?;
    let duration = args.station.duration()?;
    let chain = config.transceive_chain();

    let ((tx, _), (rx, _)) = SimulatedRadio::loopback(reference_radio(), AIR_CAPACITY);
    info!("simulated radios looped back over the air");
    let topology = tone_transceiver(&chain, Box::new(tx), Box::new(rx))?;

    println!("Transceiver '{}'", config.name);
    println!("  Rate:  {} Hz", chain.sample_rate);
    println!("  Tone:  {:+} Hz at {}", chain.tone_offset, chain.tone_amplitude);
    println!("  TX:    {:.3} MHz, {} dB, {}", chain.tx.center_freq / 1e6, chain.tx.gain, chain.tx.antenna);
    println!("  RX:    {:.3} MHz, {} dB, {}", chain.rx.center_freq / 1e6, chain.rx.gain, chain.rx.antenna);

    run_topology(topology, duration)
}
