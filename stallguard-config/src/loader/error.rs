//! Failures that stop configuration from loading at all.

use std::path::PathBuf;

use thiserror::Error;

/// The configuration sources could not be read.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// An explicitly named config file does not exist.
    #[error("configuration file missing: {path}")]
    MissingConfig {
        /// The named file.
        path: PathBuf,
    },
    /// The config file exists but could not be read.
    #[error("failed to read configuration {path}")]
    Io {
        /// The config file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML.
    #[error("failed to parse configuration {path}")]
    Parse {
        /// The config file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: toml::de::Error,
    },
    /// The `.env` file could not be loaded.
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
