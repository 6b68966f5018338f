//! Error types for settings resolution, directory materialization and logging.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while building or using a settings store or session.
///
/// Missing configuration and missing files are never errors; only content
/// that cannot be interpreted and filesystem writes that fail end up here.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A config file exists but its YAML is malformed.
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A config file exists but is not UTF-8 text.
    #[error("config file {} is not valid UTF-8: {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file parsed, but its top level is not a key/value mapping.
    #[error("config file {} must contain a mapping at the top level", path.display())]
    NotAMapping { path: PathBuf },

    /// A settings directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session log file could not be opened.
    #[error("failed to open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SettingsError {
    pub fn parse(path: &Path, source: serde_yaml::Error) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn encoding(path: &Path, source: std::io::Error) -> Self {
        Self::Encoding {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn not_a_mapping(path: &Path) -> Self {
        Self::NotAMapping {
            path: path.to_path_buf(),
        }
    }

    pub fn create_dir(path: &Path, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn log_file(path: &Path, source: std::io::Error) -> Self {
        Self::LogFile {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Path of the file or directory the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Parse { path, .. }
            | Self::Encoding { path, .. }
            | Self::NotAMapping { path }
            | Self::CreateDir { path, .. }
            | Self::LogFile { path, .. } => path,
        }
    }
}

/// Result type for settings and session operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
