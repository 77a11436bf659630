//! Preset management commands.

use clap::{Args, Subcommand};
use onda_config::{
    StationConfig, ensure_user_presets_dir, factory_presets, list_user_presets,
    preset_name_from_path, resolve_preset, user_presets_dir, validate_station,
};

#[derive(Args)]
pub struct PresetsArgs {
    #[command(subcommand)]
    command: Option<PresetsCommand>,
}

#[derive(Subcommand)]
enum PresetsCommand {
    /// List factory and user presets
    List {
        /// Show only factory presets
        #[arg(long, conflicts_with = "user")]
        factory: bool,

        /// Show only user presets
        #[arg(long)]
        user: bool,
    },

    /// Print a preset as TOML
    Show {
        /// Preset name or path
        name: String,
    },

    /// Copy a preset into the user presets directory under a new name
    Save {
        /// Name for the new preset
        name: String,

        /// Preset to copy
        #[arg(long)]
        from: String,

        /// Description of the new preset
        #[arg(short, long)]
        description: Option<String>,

        /// Overwrite an existing user preset
        #[arg(long)]
        force: bool,
    },

    /// Show the user presets directory
    Paths,
}

pub fn run(args: PresetsArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(PresetsCommand::List {
        factory: false,
        user: false,
    }) {
        PresetsCommand::List { factory, user } => list_presets(!user, !factory),
        PresetsCommand::Show { name } => {
            let preset = resolve_preset(&name)?;
            print!("{}", preset.to_toml()?);
            Ok(())
        }
        PresetsCommand::Save {
            name,
            from,
            description,
            force,
        } => save_preset(&name, &from, description, force),
        PresetsCommand::Paths => {
            println!("User presets: {}", user_presets_dir().display());
            Ok(())
        }
    }
}

fn list_presets(show_factory: bool, show_user: bool) -> anyhow::Result<()> {
    if show_factory {
        println!("Factory Presets:");
        println!("================");
        for preset in factory_presets() {
            print_entry(&preset.name, &preset);
        }
        println!();
    }

    if show_user {
        println!("User Presets:");
        println!("=============");
        let paths = list_user_presets();
        if paths.is_empty() {
            println!("  (none)");
            println!();
            println!("  Create one with: onda presets save <name> --from <preset>");
        }
        for path in paths {
            let name = preset_name_from_path(&path).unwrap_or_else(|| "unknown".to_string());
            match StationConfig::load(&path) {
                Ok(preset) => print_entry(&name, &preset),
                Err(e) => println!("  {name:20} - (error loading: {e})"),
            }
        }
        println!();
    }
    Ok(())
}

fn print_entry(name: &str, preset: &StationConfig) {
    let desc = preset.description.as_deref().unwrap_or("");
    println!("  {name:20} {:11} {desc}", format!("[{}]", preset.mode));
}

fn save_preset(
    name: &str,
    from: &str,
    description: Option<String>,
    force: bool,
) -> anyhow::Result<()> {
    let dir = ensure_user_presets_dir()?;
    let path = dir.join(format!("{name}.toml"));
    if path.exists() && !force {
        anyhow::bail!("preset '{name}' already exists, use --force to overwrite");
    }

    let mut preset = resolve_preset(from)?;
    preset.name = name.to_string();
    if let Some(description) = description {
        preset.description = Some(description);
    }
    validate_station(&preset)?;
    preset.save(&path)?;
    println!("Saved preset '{name}' to {}", path.display());
    Ok(())
}
