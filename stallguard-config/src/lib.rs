//! Configuration for Stallguard.
//!
//! Settings come from a flat TOML file, an optional `.env` file and
//! `STALLGUARD_*` environment variables, with the environment taking
//! precedence. Values are kept as raw text and only parsed when a stage of
//! the batch check asks for them through [`stallguard_core::BatchSettings`].

pub mod loader;
pub mod settings;
pub mod sources;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, error::ConfigLoadError,
};
pub use settings::{DEFAULT_SMTP_PORT, Settings};
pub use sources::{EnvConfig, FileConfig, RawValue};
pub use util::split_recipients;
pub use validation::{ConfigWarning, ConfigWarnings};
