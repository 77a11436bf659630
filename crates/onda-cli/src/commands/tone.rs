//! Baseband tone command.

use clap::Args;
use onda_config::Mode;
use onda_io::baseband_tone;

use super::common::{StationArgs, run_topology, simulated_radio};

#[derive(Args)]
pub struct ToneArgs {
    #[command(flatten)]
    station: StationArgs,
}

pub fn run(args: ToneArgs) -> anyhow::Result<()> {
    let config = args.station.load("fm-tx-usrp1-rfx900", Mode::Tone)?;
    let duration = args.station.duration()?;
    let chain = config.tone_chain();
    let topology = baseband_tone(&chain, Box::new(simulated_radio()))?;

    println!("Baseband tone '{}'", config.name);
    println!("  Tone:    {} Hz x {} at {} Hz", chain.tone_freq, chain.scale, chain.sample_rate);
    println!("  Carrier: {:.3} MHz, {} dB, {}", chain.radio.center_freq / 1e6, chain.radio.gain, chain.radio.antenna);

    run_topology(topology, duration)
}
