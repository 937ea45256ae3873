//! The two raw settings sources: the TOML file and the environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::util::non_blank;

/// A settings value as written in the file.
///
/// Any TOML value is accepted here; whether it makes sense for its key is
/// only decided when a stage asks for that setting.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// A bare integer, e.g. `age = 4`.
    Integer(i64),
    /// A bare float. Kept with its decimal point so integer settings
    /// reject it.
    Float(f64),
    /// A bare boolean.
    Bool(bool),
    /// A quoted string.
    Text(String),
    /// Arrays, tables and datetimes.
    Other(toml::Value),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Integer(value) => write!(f, "{value}"),
            // Debug keeps the fraction: `25.0` stays `25.0`, not `25`.
            RawValue::Float(value) => write!(f, "{value:?}"),
            RawValue::Bool(value) => write!(f, "{value}"),
            RawValue::Text(value) => f.write_str(value),
            RawValue::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<RawValue> for String {
    fn from(value: RawValue) -> Self {
        match value {
            RawValue::Text(text) => text,
            other => other.to_string(),
        }
    }
}

/// Raw configuration as defined in a TOML file.
///
/// Keys use the flat legacy names (`readpath`, `smtpHost`); snake_case
/// spellings are accepted as aliases.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    /// Directory to monitor.
    #[serde(default, alias = "read_path")]
    pub readpath: Option<RawValue>,
    /// Age threshold in whole hours.
    #[serde(default)]
    pub age: Option<RawValue>,
    /// Semicolon-separated primary recipients.
    #[serde(default)]
    pub to: Option<RawValue>,
    /// Semicolon-separated carbon-copy recipients.
    #[serde(default)]
    pub cc: Option<RawValue>,
    /// Sender address.
    #[serde(default)]
    pub from: Option<RawValue>,
    /// Alert subject line.
    #[serde(default)]
    pub subject: Option<RawValue>,
    /// Text placed above the file listing.
    #[serde(default)]
    pub body: Option<RawValue>,
    /// SMTP relay host.
    #[serde(default, rename = "smtpHost", alias = "smtp_host")]
    pub smtp_host: Option<RawValue>,
    /// SMTP relay port.
    #[serde(default, alias = "smtp_port")]
    pub port: Option<RawValue>,
    /// `created` or `modified`.
    #[serde(default, alias = "timestampSource")]
    pub timestamp_source: Option<RawValue>,
    /// Batch re-check interval in watch mode, e.g. `15m`.
    #[serde(default, alias = "watchRecheck")]
    pub watch_recheck: Option<RawValue>,
    /// Anything else in the file; reported as a warning, never an error.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

/// `STALLGUARD_*` variables from the process environment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// `STALLGUARD_CONFIG`
    pub config_path: Option<PathBuf>,
    /// `STALLGUARD_READPATH`
    pub readpath: Option<String>,
    /// `STALLGUARD_AGE`
    pub age: Option<String>,
    /// `STALLGUARD_TO`
    pub to: Option<String>,
    /// `STALLGUARD_CC`
    pub cc: Option<String>,
    /// `STALLGUARD_FROM`
    pub from: Option<String>,
    /// `STALLGUARD_SUBJECT`
    pub subject: Option<String>,
    /// `STALLGUARD_BODY`
    pub body: Option<String>,
    /// `STALLGUARD_SMTP_HOST`
    pub smtp_host: Option<String>,
    /// `STALLGUARD_SMTP_PORT`
    pub port: Option<String>,
    /// `STALLGUARD_TIMESTAMP_SOURCE`
    pub timestamp_source: Option<String>,
    /// `STALLGUARD_WATCH_RECHECK`
    pub watch_recheck: Option<String>,
}

impl EnvConfig {
    /// Read the current process environment.
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| non_blank(lookup(name));

        Self {
            config_path: var("STALLGUARD_CONFIG").map(PathBuf::from),
            readpath: var("STALLGUARD_READPATH"),
            age: var("STALLGUARD_AGE"),
            to: var("STALLGUARD_TO"),
            cc: var("STALLGUARD_CC"),
            from: var("STALLGUARD_FROM"),
            subject: var("STALLGUARD_SUBJECT"),
            body: var("STALLGUARD_BODY"),
            smtp_host: var("STALLGUARD_SMTP_HOST"),
            port: var("STALLGUARD_SMTP_PORT"),
            timestamp_source: var("STALLGUARD_TIMESTAMP_SOURCE"),
            watch_recheck: var("STALLGUARD_WATCH_RECHECK"),
        }
    }
}
