//! Stall detection over a single snapshot.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::age::{self, AgeThreshold};
use crate::snapshot::{FileRecord, Snapshot, SnapshotEntry};

/// Files that exceeded the age threshold during one scan, in scan order.
///
/// Built by [`detect`] and handed straight to the notifier; a new set is
/// produced for every run and never merged with a previous one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StalledFileSet {
    records: Vec<FileRecord>,
}

impl StalledFileSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record, keeping scan order.
    pub fn push(&mut self, record: FileRecord) {
        self.records.push(record);
    }

    /// Number of stalled files.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when nothing is stalled.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in scan order.
    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }

    /// File names in scan order.
    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }
}

impl FromIterator<FileRecord> for StalledFileSet {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a StalledFileSet {
    type Item = &'a FileRecord;
    type IntoIter = std::slice::Iter<'a, FileRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Apply the age threshold to every entry of `snapshot`.
///
/// Entries whose timestamp could not be read are logged and left out;
/// one bad file never aborts the run.
pub fn detect(
    snapshot: &Snapshot,
    threshold: AgeThreshold,
    now: DateTime<Utc>,
) -> StalledFileSet {
    let mut stalled = StalledFileSet::new();
    debug!(threshold = %threshold, "checking age of files found");

    for entry in snapshot.entries() {
        match entry {
            SnapshotEntry::File(record) => {
                let elapsed = age::elapsed_since(record.created, now);
                debug!(
                    file = %record.name,
                    elapsed = %humantime::format_duration(elapsed),
                    "elapsed age"
                );
                if age::is_stalled(record.created, now, threshold) {
                    info!(
                        file = %record.path.display(),
                        "file has aged longer than expected"
                    );
                    stalled.push(record.clone());
                }
            }
            SnapshotEntry::Unreadable { path, error, .. } => {
                warn!(
                    file = %path.display(),
                    "skipping file whose timestamp could not be read: {error}"
                );
            }
        }
    }

    stalled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    use chrono::TimeDelta;

    fn record(name: &str, created: DateTime<Utc>) -> SnapshotEntry {
        SnapshotEntry::File(FileRecord {
            name: name.to_string(),
            path: PathBuf::from("/inbound").join(name),
            created,
        })
    }

    fn unreadable(name: &str) -> SnapshotEntry {
        SnapshotEntry::Unreadable {
            name: name.to_string(),
            path: PathBuf::from("/inbound").join(name),
            error: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        }
    }

    #[test]
    fn keeps_only_stalled_files_in_scan_order() {
        let now = Utc::now();
        let snapshot = Snapshot::from_entries(
            "/inbound",
            vec![
                record("first.xml", now - TimeDelta::hours(2)),
                record("second.xml", now - TimeDelta::minutes(30)),
                record("third.xml", now - TimeDelta::hours(5)),
            ],
        );

        let stalled = detect(&snapshot, AgeThreshold::from_hours(1), now);
        assert_eq!(stalled.names(), vec!["first.xml", "third.xml"]);
    }

    #[test]
    fn order_follows_snapshot_not_age_or_name() {
        let now = Utc::now();
        let snapshot = Snapshot::from_entries(
            "/inbound",
            vec![
                record("zeta", now - TimeDelta::hours(3)),
                record("alpha", now - TimeDelta::hours(9)),
                record("mid", now - TimeDelta::hours(4)),
            ],
        );

        let stalled = detect(&snapshot, AgeThreshold::from_hours(1), now);
        assert_eq!(stalled.names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let now = Utc::now();
        let snapshot = Snapshot::from_entries(
            "/inbound",
            vec![
                unreadable("locked.bin"),
                record("old.bin", now - TimeDelta::hours(8)),
                unreadable("also-locked.bin"),
            ],
        );

        let stalled = detect(&snapshot, AgeThreshold::from_hours(1), now);
        assert_eq!(stalled.names(), vec!["old.bin"]);
    }

    #[test]
    fn count_matches_files_past_threshold() {
        let now = Utc::now();
        let entries: Vec<_> = (0..20)
            .map(|i| {
                // Every third file is two hours old, the rest ten minutes.
                let age = if i % 3 == 0 {
                    TimeDelta::hours(2)
                } else {
                    TimeDelta::minutes(10)
                };
                record(&format!("file-{i:02}"), now - age)
            })
            .collect();
        let snapshot = Snapshot::from_entries("/inbound", entries);

        let stalled = detect(&snapshot, AgeThreshold::from_hours(1), now);
        assert_eq!(stalled.len(), 7);
        assert_eq!(
            stalled.names(),
            vec![
                "file-00", "file-03", "file-06", "file-09", "file-12",
                "file-15", "file-18"
            ]
        );
    }

    #[test]
    fn empty_snapshot_yields_empty_set() {
        let snapshot = Snapshot::from_entries("/inbound", Vec::new());
        let stalled =
            detect(&snapshot, AgeThreshold::from_hours(1), Utc::now());
        assert!(stalled.is_empty());
    }
}
