//! Platform-specific paths for user presets.
//!
//! - Linux: `~/.config/onda/presets/`
//! - macOS: `~/Library/Application Support/onda/presets/`
//! - Windows: `%APPDATA%\onda\presets\`

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::factory_presets::get_factory_preset;
use crate::preset::StationConfig;

/// Application name used for directory paths.
const APP_NAME: &str = "onda";

/// Subdirectory name for presets.
const PRESETS_SUBDIR: &str = "presets";

/// Returns the user configuration directory, or `./onda` when the platform
/// has none.
pub fn user_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Returns the user presets directory.
pub fn user_presets_dir() -> PathBuf {
    user_config_dir().join(PRESETS_SUBDIR)
}

/// Creates the user presets directory if needed and returns it.
pub fn ensure_user_presets_dir() -> Result<PathBuf, ConfigError> {
    let dir = user_presets_dir();
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::create_dir(&dir, e))?;
    }
    Ok(dir)
}

/// Finds a preset file by path or by name in the user presets directory.
pub fn find_preset(name: &str) -> Option<PathBuf> {
    find_preset_in(name, &user_presets_dir())
}

/// Finds a preset file by path or by name in `dir`.
///
/// `name` may be a path to an existing file, or a preset name with or
/// without the `.toml` extension.
pub fn find_preset_in(name: &str, dir: &Path) -> Option<PathBuf> {
    let path = PathBuf::from(name);
    if path.is_file() {
        return Some(path);
    }
    let filename = if name.ends_with(".toml") {
        name.to_string()
    } else {
        format!("{name}.toml")
    };
    let candidate = dir.join(filename);
    candidate.is_file().then_some(candidate)
}

/// Resolves a preset: factory presets first, then files via [`find_preset`].
pub fn resolve_preset(name: &str) -> Result<StationConfig, ConfigError> {
    resolve_preset_in(name, &user_presets_dir())
}

/// Resolves a preset against the factory set and then `dir`.
pub fn resolve_preset_in(name: &str, dir: &Path) -> Result<StationConfig, ConfigError> {
    if let Some(preset) = get_factory_preset(name) {
        return Ok(preset);
    }
    match find_preset_in(name, dir) {
        Some(path) => StationConfig::load(path),
        None => Err(ConfigError::PresetNotFound(name.to_string())),
    }
}

/// Lists the `.toml` files in the user presets directory.
pub fn list_user_presets() -> Vec<PathBuf> {
    list_presets_in_dir(&user_presets_dir())
}

fn list_presets_in_dir(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut presets: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    presets.sort();
    presets
}

/// Preset name from a file path (the file stem).
///
/// ```rust
/// use onda_config::paths::preset_name_from_path;
/// use std::path::Path;
///
/// let name = preset_name_from_path(Path::new("/presets/night-watch.toml"));
/// assert_eq!(name, Some("night-watch".to_string()));
/// ```
pub fn preset_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}
