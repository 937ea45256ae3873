//! One-shot scan, detect and notify pipeline.
//!
//! ```text
//! START -> PathCheck -(fail)-> ABORT
//!            |
//!          Scan -(empty)-> DONE
//!            |
//!         Detect -(nothing stalled)-> DONE
//!            |
//!         Notify -> DONE
//! ```
//!
//! Each stage pulls only the settings it needs at the moment it runs, so
//! a broken mail setting never prevents a scan and a broken threshold
//! aborts at `Detect`, not before.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::age::AgeThreshold;
use crate::alert::{
    self, AlertSettings, MailTransport, NotifyError, NotifyOutcome,
    RecipientConfigurationError,
};
use crate::detect::{self, StalledFileSet};
use crate::error::{BatchError, ConfigurationError, Result};
use crate::snapshot::{MonitoredDirectory, TimestampSource};

/// Where the batch check reads its settings from.
///
/// Accessors are called lazily, one per stage, and report missing or
/// malformed values as [`ConfigurationError`].
pub trait BatchSettings {
    /// Read by PathCheck.
    fn monitored_directory(
        &self,
    ) -> std::result::Result<MonitoredDirectory, ConfigurationError>;

    /// Read by Scan.
    fn timestamp_source(
        &self,
    ) -> std::result::Result<TimestampSource, ConfigurationError>;

    /// Read by Detect.
    fn age_threshold(
        &self,
    ) -> std::result::Result<AgeThreshold, ConfigurationError>;

    /// Read by Notify, only when something is stalled.
    fn alert_settings(
        &self,
    ) -> std::result::Result<AlertSettings, ConfigurationError>;
}

/// How a batch check finished when nothing went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The directory exists but holds no files.
    EmptyDirectory,
    /// Files are present but none has aged past the threshold.
    NothingStalled {
        /// Entries seen by the scan.
        scanned: usize,
    },
    /// Stalled files were found; sending was disabled for this run.
    DryRun {
        /// What would have been reported.
        stalled: StalledFileSet,
    },
    /// Stalled files were found and one alert was delivered.
    Alerted {
        /// The files listed in the alert.
        stalled: StalledFileSet,
        /// Addresses the relay accepted the message for.
        recipients: usize,
        /// Addresses dropped because they did not parse.
        rejected: Vec<RecipientConfigurationError>,
    },
}

/// One pass of PathCheck, Scan, Detect and Notify.
pub struct BatchCheck<'a, S: BatchSettings + ?Sized> {
    settings: &'a S,
    transport: &'a dyn MailTransport,
    dry_run: bool,
}

impl<S: BatchSettings + ?Sized> std::fmt::Debug for BatchCheck<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchCheck")
            .field("settings_type", &std::any::type_name::<S>())
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl<'a, S: BatchSettings + ?Sized> BatchCheck<'a, S> {
    /// A check that delivers through `transport`.
    pub fn new(settings: &'a S, transport: &'a dyn MailTransport) -> Self {
        Self {
            settings,
            transport,
            dry_run: false,
        }
    }

    /// Scan and detect as usual but never hand anything to the transport.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the pipeline against the current time.
    pub fn run(&self) -> Result<BatchOutcome> {
        self.run_at(Utc::now())
    }

    /// Run the pipeline with `now` as the reference time for ages.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<BatchOutcome> {
        info!("checking for stalled files");
        let result = self.execute(now);

        match &result {
            Ok(outcome) => log_outcome(outcome),
            Err(BatchError::PathUnavailable { path, source }) => {
                warn!(
                    path = %path.display(),
                    "{source}; file check aborted"
                );
            }
            Err(BatchError::Configuration(err)) => {
                error!("file check aborted: {err}");
            }
            Err(BatchError::Delivery(err)) => {
                error!("email could not be delivered: {err}");
            }
        }

        result
    }

    fn execute(&self, now: DateTime<Utc>) -> Result<BatchOutcome> {
        // PathCheck
        let directory = self.settings.monitored_directory()?;
        if let Err(source) = directory.check() {
            return Err(BatchError::PathUnavailable {
                path: directory.path().to_path_buf(),
                source,
            });
        }
        info!(path = %directory, "monitored directory is a valid path");

        // Scan
        let source = self.settings.timestamp_source()?;
        let snapshot = directory.scan(source).map_err(|source| {
            BatchError::PathUnavailable {
                path: directory.path().to_path_buf(),
                source,
            }
        })?;
        if snapshot.is_empty() {
            return Ok(BatchOutcome::EmptyDirectory);
        }
        info!(
            path = %directory,
            files = snapshot.len(),
            timestamp = %source,
            "files found in target directory"
        );

        // Detect
        let threshold = self.settings.age_threshold()?;
        let stalled = detect::detect(&snapshot, threshold, now);
        if stalled.is_empty() {
            return Ok(BatchOutcome::NothingStalled {
                scanned: snapshot.len(),
            });
        }

        if self.dry_run {
            return Ok(BatchOutcome::DryRun { stalled });
        }

        // Notify
        let alert_settings = self.settings.alert_settings()?;
        match alert::notify(&stalled, &alert_settings, self.transport) {
            Ok(NotifyOutcome::Sent {
                recipients,
                rejected,
                ..
            }) => Ok(BatchOutcome::Alerted {
                stalled,
                recipients,
                rejected,
            }),
            Ok(NotifyOutcome::NothingToSend) => {
                Ok(BatchOutcome::NothingStalled {
                    scanned: snapshot.len(),
                })
            }
            Err(NotifyError::Configuration(err)) => {
                Err(BatchError::Configuration(err))
            }
            Err(NotifyError::Delivery(err)) => Err(BatchError::Delivery(err)),
        }
    }
}

fn log_outcome(outcome: &BatchOutcome) {
    match outcome {
        BatchOutcome::EmptyDirectory => {
            debug!("no files found in the directory");
        }
        BatchOutcome::NothingStalled { scanned } => {
            info!(
                scanned,
                "files were found in target directory, but haven't aged \
                 to meet the criteria for alerting"
            );
        }
        BatchOutcome::DryRun { stalled } => {
            for record in stalled {
                info!(
                    file = %record.path.display(),
                    "would alert on stalled file"
                );
            }
            info!(stalled = stalled.len(), "dry run: alert not sent");
        }
        BatchOutcome::Alerted {
            stalled,
            recipients,
            rejected,
        } => {
            info!(
                stalled = stalled.len(),
                recipients,
                rejected = rejected.len(),
                "stall alert delivered"
            );
        }
    }
    info!("file check completed");
}
