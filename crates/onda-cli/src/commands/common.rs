//! Station options shared by the streaming commands, and the run loop.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Args;
use onda_config::{ConfigError, Mode, StationConfig, resolve_preset, validate_for_device};
use onda_io::{DeviceCapabilities, RunStats, SimulatedRadio, Topology};
use tracing::{debug, info};

/// How often the run loop reports the displays while the station runs.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args, Debug, Clone)]
pub struct StationArgs {
    /// Preset name (factory or user preset)
    #[arg(short, long)]
    pub preset: Option<String>,

    /// Preset file to load instead of a named preset
    #[arg(short, long, conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Center frequency in Hz
    #[arg(long)]
    pub freq: Option<f64>,

    /// Gain in dB
    #[arg(long)]
    pub gain: Option<f64>,

    /// Antenna port
    #[arg(long)]
    pub antenna: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    pub duration: Option<f64>,
}

impl StationArgs {
    /// Loads the preset, applies command-line overrides, and validates the
    /// result against the radio.
    pub fn load(&self, default_preset: &str, mode: Mode) -> anyhow::Result<StationConfig> {
        let mut config = match (&self.config, &self.preset) {
            (Some(path), _) => StationConfig::load(path)?,
            (None, Some(name)) => resolve_preset(name)?,
            (None, None) => resolve_preset(default_preset)?,
        };
        if config.mode != mode {
            return Err(ConfigError::WrongMode {
                name: config.name.clone(),
                expected: mode.to_string(),
                actual: config.mode.to_string(),
            }
            .into());
        }
        if let Some(freq) = self.freq {
            config.radio.center_freq = freq;
        }
        if let Some(gain) = self.gain {
            config.radio.gain = gain;
        }
        if let Some(antenna) = &self.antenna {
            config.radio.antenna = antenna.clone();
        }
        validate_for_device(&config, &reference_radio())
            .with_context(|| format!("preset '{}'", config.name))?;
        info!(preset = %config.name, mode = %config.mode, "station configured");
        Ok(config)
    }

    /// Run duration, if one was given.
    pub fn duration(&self) -> anyhow::Result<Option<Duration>> {
        match self.duration {
            None => Ok(None),
            Some(secs) if secs.is_finite() && secs > 0.0 => Ok(Some(Duration::from_secs_f64(secs))),
            Some(secs) => bail!("--duration must be a positive number of seconds, got {secs}"),
        }
    }
}

/// The radio every preset is validated against.
pub fn reference_radio() -> DeviceCapabilities {
    DeviceCapabilities::usrp1_rfx900()
}

/// A simulated radio standing in for the hardware.
pub fn simulated_radio() -> SimulatedRadio {
    let (radio, _) = SimulatedRadio::new(reference_radio());
    info!(radio = %reference_radio().name, "streaming through the simulated radio");
    radio
}

/// Starts the station, then polls it until Ctrl+C, the duration elapses, or
/// it stops by itself. Reports display taps along the way.
pub fn run_topology(mut topology: Topology, duration: Option<Duration>) -> anyhow::Result<()> {
    let stop = topology.station.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("failed to install Ctrl+C handler")?;

    topology.station.start()?;
    match duration {
        Some(d) => println!("Running for {:.1} s (Ctrl+C stops early)...", d.as_secs_f64()),
        None => println!("Running. Press Ctrl+C to stop..."),
    }

    let deadline = duration.map(|d| Instant::now() + d);
    let result = loop {
        let step = deadline.map_or(REPORT_INTERVAL, |d| {
            REPORT_INTERVAL.min(d.saturating_duration_since(Instant::now()))
        });
        match topology.station.wait_timeout(step) {
            Ok(false) => {}
            Ok(true) => break Ok(()),
            Err(e) => break Err(e),
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            topology.station.stop()?;
            break topology.station.wait();
        }
        report_displays(&mut topology);
    };

    print_stats(&topology.station.stats());
    result?;
    Ok(())
}

fn report_displays(topology: &mut Topology) {
    if let Some(spectrum) = topology.spectrum.as_mut()
        && let Some((freq, db)) = spectrum.snapshot().and_then(|s| s.peak())
    {
        info!(peak_mhz = freq / 1e6, level_db = db, "spectrum");
    }
    if let Some(frame) = topology.scope.as_ref().and_then(|scope| scope.snapshot()) {
        let power = frame.iter().map(|c| c.norm_sqr()).sum::<f32>() / frame.len() as f32;
        debug!(rms = power.sqrt(), "scope");
    }
}

fn print_stats(stats: &RunStats) {
    println!("Stopped after {} scheduler ticks", stats.ticks);
    for endpoint in &stats.endpoints {
        println!(
            "  {}: {} samples streamed, {} underruns, {} overruns",
            endpoint.label, endpoint.streamed, endpoint.underruns, endpoint.overruns
        );
    }
}
