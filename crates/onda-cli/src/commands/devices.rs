//! Radio profile and audio device listing.

use clap::Args;
use onda_io::{StreamDirection, list_audio_devices};

use super::common::reference_radio;

#[derive(Args)]
pub struct DevicesArgs {
    /// Skip audio device enumeration
    #[arg(long)]
    no_audio: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let caps = reference_radio();
    println!("Radio Profiles");
    println!("==============\n");
    println!("{} (simulated)", caps.name);
    println!(
        "  Sample rate: {} - {} S/s",
        caps.sample_rate.start(),
        caps.sample_rate.end()
    );
    println!(
        "  Frequency:   {:.0} - {:.0} MHz",
        caps.center_freq.start() / 1e6,
        caps.center_freq.end() / 1e6
    );
    println!("  Gain:        {} - {} dB", caps.gain.start(), caps.gain.end());
    for direction in [StreamDirection::Receive, StreamDirection::Transmit] {
        println!("  {direction} antennas: {}", caps.antennas(direction).join(", "));
    }

    if args.no_audio {
        return Ok(());
    }
    println!();
    println!("Audio Devices");
    println!("=============\n");
    match list_audio_devices() {
        Ok(devices) if devices.is_empty() => println!("  (none found)"),
        Ok(devices) => {
            for device in devices {
                let kind = match (device.is_input, device.is_output) {
                    (true, true) => "input/output",
                    (true, false) => "input",
                    _ => "output",
                };
                println!("  {} ({kind}, {} Hz)", device.name, device.default_sample_rate);
            }
        }
        Err(e) => println!("  (audio host unavailable: {e})"),
    }
    Ok(())
}
