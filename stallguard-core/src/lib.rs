//! Stalled-file detection for a single watched directory.
//!
//! A batch run takes one [`snapshot`] of the directory, keeps the files whose
//! creation time is older than the configured [`age`] threshold and sends a
//! single [`alert`] listing them. [`batch::BatchCheck`] drives that pipeline
//! and reads settings lazily through [`batch::BatchSettings`], so a bad value
//! only fails the run once the stage that needs it is reached.
//!
//! [`watch`] is the long-running alternative: it logs creations, deletions
//! and renames as they happen and can optionally re-run the batch check on
//! an interval.

pub mod age;
pub mod alert;
pub mod batch;
pub mod detect;
pub mod error;
pub mod snapshot;
pub mod watch;

pub use age::{AgeThreshold, is_stalled};
pub use alert::{
    AlertMessage, AlertSettings, MailTransport, NotifyError, NotifyOutcome,
    RecipientConfigurationError, SmtpMailer, SmtpSettings, TransportError,
    notify,
};
pub use batch::{BatchCheck, BatchOutcome, BatchSettings};
pub use detect::{StalledFileSet, detect};
pub use error::{BatchError, ConfigurationError};
pub use snapshot::{
    FileRecord, MonitoredDirectory, Snapshot, SnapshotEntry, SnapshotError,
    TimestampSource,
};
pub use watch::{
    DirectoryWatch, LogObserver, WatchConfig, WatchError, WatchEvent,
    WatchObserver,
};
