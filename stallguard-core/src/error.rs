//! Error types shared across the batch pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::alert::TransportError;
use crate::snapshot::SnapshotError;

/// A setting was missing or could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The setting has no value and no fallback.
    #[error("required setting '{key}' is not configured")]
    Missing {
        /// Setting name as written in the config file.
        key: &'static str,
    },

    /// The setting has a value that cannot be used.
    #[error("setting '{key}' has invalid value '{value}': {reason}")]
    Invalid {
        /// Setting name as written in the config file.
        key: &'static str,
        /// The offending raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::Invalid`].
    pub fn invalid(
        key: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Reasons a batch check stops before completing normally.
#[derive(Error, Debug)]
pub enum BatchError {
    /// The directory is missing, not a directory, or cannot be listed.
    #[error("monitored directory {path} is unavailable")]
    PathUnavailable {
        /// Configured directory path.
        path: PathBuf,
        /// What went wrong when checking or listing it.
        #[source]
        source: SnapshotError,
    },

    /// A setting needed by the current stage is missing or malformed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The relay did not take the alert. Not retried.
    #[error("stall alert could not be delivered")]
    Delivery(#[source] TransportError),
}

/// Result of a batch check.
pub type Result<T> = std::result::Result<T, BatchError>;
