//! onda CLI: runs FM and tone stations built from presets.

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onda")]
#[command(author, version, about = "Block dataflow SDR station runner", long_about = None)]
struct Cli {
    /// Raise logging to debug (-v) or trace (-vv); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an FM transmitter
    Tx(commands::tx::TxArgs),

    /// Run an FM receiver
    Rx(commands::rx::RxArgs),

    /// Transmit a complex tone and watch the received spectrum
    Transceive(commands::transceive::TransceiveArgs),

    /// Transmit an unmodulated baseband tone
    Tone(commands::tone::ToneArgs),

    /// List, show, and save station presets
    Presets(commands::presets::PresetsArgs),

    /// Show radio profiles and audio devices
    Devices(commands::devices::DevicesArgs),
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Tx(args) => commands::tx::run(args),
        Commands::Rx(args) => commands::rx::run(args),
        Commands::Transceive(args) => commands::transceive::run(args),
        Commands::Tone(args) => commands::tone::run(args),
        Commands::Presets(args) => commands::presets::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
