//! Merged settings and their typed, lazily validated accessors.

use std::time::Duration;

use stallguard_core::{
    AgeThreshold, AlertSettings, BatchSettings, ConfigurationError,
    MonitoredDirectory, SmtpSettings, TimestampSource,
};

use crate::sources::{EnvConfig, FileConfig};
use crate::util::{non_blank, split_recipients};

/// Relay port used when `port` is unset.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Every setting as the raw text it was configured with.
///
/// Nothing is validated up front. Each accessor parses the one value it
/// needs when called, so a malformed mail setting only surfaces once an
/// alert is actually about to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Raw `readpath`.
    pub readpath: Option<String>,
    /// Raw `age`.
    pub age: Option<String>,
    /// Raw `to`.
    pub to: Option<String>,
    /// Raw `cc`.
    pub cc: Option<String>,
    /// Raw `from`.
    pub from: Option<String>,
    /// Raw `subject`.
    pub subject: Option<String>,
    /// Raw `body`.
    pub body: Option<String>,
    /// Raw `smtpHost`.
    pub smtp_host: Option<String>,
    /// Raw `port`.
    pub port: Option<String>,
    /// Raw `timestamp_source`.
    pub timestamp_source: Option<String>,
    /// Raw `watch_recheck`.
    pub watch_recheck: Option<String>,
}

impl Settings {
    /// Environment values win over file values.
    pub fn merge(file: FileConfig, env: EnvConfig) -> Self {
        let pick = |env: Option<String>, file: Option<_>| {
            env.or_else(|| non_blank(file.map(String::from)))
        };

        Self {
            readpath: pick(env.readpath, file.readpath),
            age: pick(env.age, file.age),
            to: pick(env.to, file.to),
            cc: pick(env.cc, file.cc),
            from: pick(env.from, file.from),
            subject: pick(env.subject, file.subject),
            body: pick(env.body, file.body),
            smtp_host: pick(env.smtp_host, file.smtp_host),
            port: pick(env.port, file.port),
            timestamp_source: pick(env.timestamp_source, file.timestamp_source),
            watch_recheck: pick(env.watch_recheck, file.watch_recheck),
        }
    }

    /// Interval for re-running the batch check while watching; `None` when
    /// not configured.
    pub fn watch_recheck(
        &self,
    ) -> Result<Option<Duration>, ConfigurationError> {
        let Some(raw) = self.watch_recheck.as_deref() else {
            return Ok(None);
        };
        let interval = humantime::parse_duration(raw.trim()).map_err(|err| {
            ConfigurationError::invalid("watch_recheck", raw, err.to_string())
        })?;
        if interval.is_zero() {
            return Err(ConfigurationError::invalid(
                "watch_recheck",
                raw,
                "interval must be greater than zero",
            ));
        }
        Ok(Some(interval))
    }

    /// Relay host and port. The host is required.
    pub fn smtp(&self) -> Result<SmtpSettings, ConfigurationError> {
        let host = required("smtpHost", &self.smtp_host)?.trim().to_string();
        let port = match self.port.as_deref() {
            None => DEFAULT_SMTP_PORT,
            Some(raw) => raw.trim().parse::<u16>().map_err(|err| {
                ConfigurationError::invalid("port", raw, err.to_string())
            })?,
        };
        Ok(SmtpSettings { host, port })
    }
}

fn required<'a>(
    key: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, ConfigurationError> {
    value
        .as_deref()
        .ok_or(ConfigurationError::Missing { key })
}

impl BatchSettings for Settings {
    fn monitored_directory(
        &self,
    ) -> Result<MonitoredDirectory, ConfigurationError> {
        required("readpath", &self.readpath)
            .map(|path| MonitoredDirectory::new(path.trim()))
    }

    fn timestamp_source(&self) -> Result<TimestampSource, ConfigurationError> {
        match self.timestamp_source.as_deref() {
            None => Ok(TimestampSource::default()),
            Some(raw) => raw.parse().map_err(|reason: String| {
                ConfigurationError::invalid("timestamp_source", raw, reason)
            }),
        }
    }

    fn age_threshold(&self) -> Result<AgeThreshold, ConfigurationError> {
        let raw = required("age", &self.age)?;
        raw.trim()
            .parse::<u64>()
            .map(AgeThreshold::from_hours)
            .map_err(|_| {
                ConfigurationError::invalid(
                    "age",
                    raw,
                    "expected a non-negative whole number of hours",
                )
            })
    }

    fn alert_settings(&self) -> Result<AlertSettings, ConfigurationError> {
        let to = split_recipients(required("to", &self.to)?);
        if to.is_empty() {
            return Err(ConfigurationError::Missing { key: "to" });
        }

        Ok(AlertSettings {
            to,
            cc: self
                .cc
                .as_deref()
                .map(split_recipients)
                .unwrap_or_default(),
            from: required("from", &self.from)?.trim().to_string(),
            subject: required("subject", &self.subject)?.to_string(),
            body_prefix: self.body.clone().unwrap_or_default(),
            smtp: self.smtp()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Settings {
        Settings {
            readpath: Some("/srv/inbound".into()),
            age: Some("2".into()),
            to: Some("a@x.com;;b@x.com".into()),
            cc: None,
            from: Some("stallguard@x.com".into()),
            subject: Some("Stalled".into()),
            body: None,
            smtp_host: Some("relay.x.com".into()),
            port: None,
            timestamp_source: None,
            watch_recheck: None,
        }
    }

    #[test]
    fn env_overrides_file() {
        let file: FileConfig =
            toml::from_str("readpath = \"/from/file\"\nage = 3\n").unwrap();
        let env = EnvConfig {
            readpath: Some("/from/env".into()),
            ..EnvConfig::default()
        };

        let merged = Settings::merge(file, env);
        assert_eq!(merged.readpath.as_deref(), Some("/from/env"));
        assert_eq!(merged.age.as_deref(), Some("3"));
    }

    #[test]
    fn blank_file_values_count_as_unset() {
        let file: FileConfig = toml::from_str("cc = \"\"\n").unwrap();
        let merged = Settings::merge(file, EnvConfig::default());
        assert_eq!(merged.cc, None);
    }

    #[test]
    fn fallbacks_apply_to_optional_keys() {
        let alert = complete().alert_settings().unwrap();
        assert_eq!(alert.to, vec!["a@x.com", "b@x.com"]);
        assert!(alert.cc.is_empty());
        assert_eq!(alert.body_prefix, "");
        assert_eq!(alert.smtp.port, DEFAULT_SMTP_PORT);
        assert_eq!(
            complete().timestamp_source().unwrap(),
            TimestampSource::Created
        );
        assert_eq!(complete().watch_recheck().unwrap(), None);
    }

    #[test]
    fn age_must_be_whole_non_negative_hours() {
        let mut settings = complete();
        assert_eq!(
            settings.age_threshold().unwrap(),
            AgeThreshold::from_hours(2)
        );

        for bad in ["-1", "1.5", "two", ""] {
            settings.age = Some(bad.into());
            assert!(
                matches!(
                    settings.age_threshold(),
                    Err(ConfigurationError::Invalid { key: "age", .. })
                ),
                "accepted {bad:?}"
            );
        }

        settings.age = None;
        assert_eq!(
            settings.age_threshold(),
            Err(ConfigurationError::Missing { key: "age" })
        );
    }

    #[test]
    fn port_must_fit_u16() {
        let mut settings = complete();
        settings.port = Some("70000".into());
        assert!(matches!(
            settings.alert_settings(),
            Err(ConfigurationError::Invalid { key: "port", .. })
        ));

        settings.port = Some(" 587 ".into());
        assert_eq!(settings.smtp().unwrap().port, 587);
    }

    #[test]
    fn broken_mail_settings_do_not_affect_scan_settings() {
        let mut settings = complete();
        settings.smtp_host = None;
        settings.port = Some("not a port".into());

        assert!(settings.monitored_directory().is_ok());
        assert!(settings.age_threshold().is_ok());
        assert_eq!(
            settings.alert_settings(),
            Err(ConfigurationError::Missing { key: "smtpHost" })
        );
    }

    #[test]
    fn recipient_list_of_only_separators_is_missing() {
        let mut settings = complete();
        settings.to = Some(";;".into());
        assert_eq!(
            settings.alert_settings(),
            Err(ConfigurationError::Missing { key: "to" })
        );
    }

    #[test]
    fn watch_recheck_parses_humantime() {
        let mut settings = complete();
        settings.watch_recheck = Some("15m".into());
        assert_eq!(
            settings.watch_recheck().unwrap(),
            Some(Duration::from_secs(15 * 60))
        );

        settings.watch_recheck = Some("0s".into());
        assert!(settings.watch_recheck().is_err());

        settings.watch_recheck = Some("soon".into());
        assert!(matches!(
            settings.watch_recheck(),
            Err(ConfigurationError::Invalid {
                key: "watch_recheck",
                ..
            })
        ));
    }

    #[test]
    fn timestamp_source_accepts_modified() {
        let mut settings = complete();
        settings.timestamp_source = Some("modified".into());
        assert_eq!(
            settings.timestamp_source().unwrap(),
            TimestampSource::Modified
        );

        settings.timestamp_source = Some("accessed".into());
        assert!(settings.timestamp_source().is_err());
    }
}
