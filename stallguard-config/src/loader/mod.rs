//! Locate, read and merge the configuration sources.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::settings::Settings;
use crate::sources::{EnvConfig, FileConfig};
use crate::validation::ConfigWarnings;

pub mod error;

use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] =
    ["stallguard.toml", "config/stallguard.toml"];

const SUPPORTED_KEYS: &str = "readpath, age, to, cc, from, subject, body, \
                              smtpHost, port, timestamp_source, watch_recheck";

/// Where the loader looks for its inputs.
#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Explicit config file; must exist when set.
    pub config_path: Option<PathBuf>,
    /// Explicit `.env` file; must exist when set.
    pub env_file: Option<PathBuf>,
    /// Directory the default config locations are resolved against.
    /// Relative to the working directory when unset.
    pub search_root: Option<PathBuf>,
}

/// Builds [`Settings`] from `.env`, the environment and a TOML file.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// Merged settings plus anything worth warning about.
#[derive(Debug)]
pub struct ConfigLoad {
    /// Merged raw settings.
    pub settings: Settings,
    /// Non-fatal findings.
    pub warnings: ConfigWarnings,
    /// The file the settings were read from, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader with default search locations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader with explicit options.
    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    /// Read this file instead of searching.
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Load this `.env` file instead of the default one.
    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Resolve default locations against `path`.
    pub fn with_search_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.search_root = Some(path.into());
        self
    }

    /// Load `.env`, read the process environment and the config file, and
    /// merge them.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };
        if let Some(path) = &self.options.env_file
            && !env_file_loaded
        {
            warnings.push(format!(
                "Env file {} could not be read; continuing without it",
                path.display()
            ));
        }
        debug!(env_file_loaded, "environment prepared");

        let mut load = self.load_from(EnvConfig::gather())?;
        warnings.extend(load.warnings);
        load.warnings = warnings;
        Ok(load)
    }

    /// Merge an already gathered environment with the config file.
    pub fn load_from(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        let (file_config, config_path) = self.load_file_config(&env)?;

        let file = match file_config {
            Some(file) => {
                for key in file.unknown.keys() {
                    warnings.push_with_hint(
                        format!("Unknown configuration key '{key}' ignored"),
                        format!("Supported keys: {SUPPORTED_KEYS}"),
                    );
                }
                file
            }
            None => {
                warnings.push_with_hint(
                    "No stallguard.toml detected; \
                     using environment variables only",
                    "Create stallguard.toml or pass --config <PATH>",
                );
                FileConfig::default()
            }
        };

        if let Some(path) = &config_path {
            debug!(path = %path.display(), "loaded configuration file");
        }

        Ok(ConfigLoad {
            settings: Settings::merge(file, env),
            warnings,
            config_path,
        })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env.config_path {
            source.env = Some(from_env.clone());
        }

        if source.is_empty() {
            let root = self
                .options
                .search_root
                .as_deref()
                .unwrap_or_else(|| Path::new(""));
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(|candidate| root.join(candidate))
                .find(|candidate| candidate.exists());
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
                path: path.clone(),
                source: err,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.env.is_none() && self.default.is_none()
    }

    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins_over_env_path() {
        let source = ConfigPathSource {
            explicit: Some("a.toml".into()),
            env: Some("b.toml".into()),
            default: None,
        };
        assert_eq!(
            source.resolved_path(),
            Some((PathBuf::from("a.toml"), ConfigPathProvenance::Explicit))
        );
    }

    #[test]
    fn env_path_counts_as_explicit() {
        assert!(ConfigPathProvenance::Env.is_explicit());
        assert!(!ConfigPathProvenance::Default.is_explicit());
    }
}
