//! Error types for configuration operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, saving, or resolving station presets.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// No factory preset, preset file, or path matched.
    #[error("preset not found: {0}")]
    PresetNotFound(String),

    /// The preset describes a different kind of station than requested.
    #[error("preset '{name}' configures {actual}, not {expected}")]
    WrongMode {
        /// Preset name.
        name: String,
        /// Mode the caller asked for.
        expected: String,
        /// Mode the preset declares.
        actual: String,
    },

    /// Validation errors
    #[error("validation failed: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_display_names_path() {
        let err = ConfigError::read_file("/a/b.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/b.toml"), "got: {msg}");
        assert!(err.source().is_some());
    }

    #[test]
    fn write_and_create_dir_keep_source() {
        assert!(ConfigError::write_file("/x", mock_io_err()).source().is_some());
        let err = ConfigError::create_dir("/a/b", mock_io_err());
        assert!(matches!(err, ConfigError::CreateDir { ref path, .. } if path == std::path::Path::new("/a/b")));
        assert!(err.source().is_some());
    }

    #[test]
    fn preset_not_found_display() {
        let err = ConfigError::PresetNotFound("fm-nope".to_string());
        assert_eq!(err.to_string(), "preset not found: fm-nope");
        assert!(err.source().is_none());
    }

    #[test]
    fn wrong_mode_display() {
        let err = ConfigError::WrongMode {
            name: "audio-fm-rx".into(),
            expected: "tx".into(),
            actual: "rx".into(),
        };
        assert_eq!(err.to_string(), "preset 'audio-fm-rx' configures rx, not tx");
    }
}
