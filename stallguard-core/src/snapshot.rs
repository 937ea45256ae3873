//! Point-in-time listings of the monitored directory.
//!
//! A [`Snapshot`] is taken fresh for every batch check and never cached.
//! Reading the directory is the only side effect; nothing is moved,
//! locked or rewritten.

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

/// The directory that receives handed-off files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredDirectory {
    path: PathBuf,
}

impl MonitoredDirectory {
    /// Wrap a configured path. Nothing is checked until [`Self::check`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The configured path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Confirm the path resolves to an existing, readable directory.
    pub fn check(&self) -> Result<(), SnapshotError> {
        let metadata = fs::metadata(&self.path)
            .map_err(|source| SnapshotError::from_io(&self.path, source))?;
        if !metadata.is_dir() {
            return Err(SnapshotError::NotADirectory {
                path: self.path.clone(),
            });
        }
        // Listing permission is what the scan actually needs.
        fs::read_dir(&self.path)
            .map(drop)
            .map_err(|source| SnapshotError::from_io(&self.path, source))
    }

    /// List the files currently present, in filesystem enumeration order.
    pub fn scan(
        &self,
        source: TimestampSource,
    ) -> Result<Snapshot, SnapshotError> {
        let reader = fs::read_dir(&self.path)
            .map_err(|err| SnapshotError::from_io(&self.path, err))?;

        let mut entries = Vec::new();
        for entry in reader {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        "skipping unreadable directory entry: {err}"
                    );
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            // Follow symlinks so a link to a file is listed like the file.
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(error) => {
                    entries.push(SnapshotEntry::Unreadable {
                        name,
                        path,
                        error,
                    });
                    continue;
                }
            };

            if metadata.is_dir() {
                debug!(path = %path.display(), "skipping subdirectory");
                continue;
            }

            match source.read(&metadata) {
                Ok(timestamp) => entries.push(SnapshotEntry::File(FileRecord {
                    name,
                    path,
                    created: timestamp,
                })),
                Err(error) => entries.push(SnapshotEntry::Unreadable {
                    name,
                    path,
                    error,
                }),
            }
        }

        Ok(Snapshot {
            directory: self.path.clone(),
            entries,
        })
    }
}

impl fmt::Display for MonitoredDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Which filesystem timestamp stands in for "when the file arrived".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampSource {
    /// Birth time. Not every platform/filesystem reports it.
    #[default]
    Created,
    /// Last modification time.
    Modified,
}

impl TimestampSource {
    fn read(self, metadata: &Metadata) -> io::Result<DateTime<Utc>> {
        let time = match self {
            TimestampSource::Created => metadata.created()?,
            TimestampSource::Modified => metadata.modified()?,
        };
        Ok(DateTime::<Utc>::from(time))
    }

    /// Name used in configuration and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            TimestampSource::Created => "created",
            TimestampSource::Modified => "modified",
        }
    }
}

impl FromStr for TimestampSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "creation" | "birth" => Ok(TimestampSource::Created),
            "modified" | "mtime" => Ok(TimestampSource::Modified),
            other => Err(format!(
                "unknown timestamp source '{other}'; \
                 expected 'created' or 'modified'"
            )),
        }
    }
}

impl fmt::Display for TimestampSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file observed in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// File name within the monitored directory.
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    /// Arrival time, read from the configured [`TimestampSource`].
    pub created: DateTime<Utc>,
}

/// A directory entry as seen by the scan.
#[derive(Debug)]
pub enum SnapshotEntry {
    /// A regular file (or a link to one) with a readable timestamp.
    File(FileRecord),
    /// The entry exists but its metadata or timestamp could not be read.
    Unreadable {
        /// File name within the monitored directory.
        name: String,
        /// Full path.
        path: PathBuf,
        /// The read failure.
        error: io::Error,
    },
}

impl SnapshotEntry {
    /// File name, whether or not the entry was readable.
    pub fn name(&self) -> &str {
        match self {
            SnapshotEntry::File(record) => &record.name,
            SnapshotEntry::Unreadable { name, .. } => name,
        }
    }
}

/// Every file entry found by one scan, in enumeration order.
#[derive(Debug)]
pub struct Snapshot {
    directory: PathBuf,
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    /// Build a snapshot from already collected entries.
    pub fn from_entries(
        directory: impl Into<PathBuf>,
        entries: Vec<SnapshotEntry>,
    ) -> Self {
        Self {
            directory: directory.into(),
            entries,
        }
    }

    /// The directory that was scanned.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Entries in enumeration order.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    /// Number of entries, unreadable ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the directory held no files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The monitored directory cannot be listed.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Nothing exists at the path.
    #[error("{path} was not found")]
    NotFound {
        /// The configured path.
        path: PathBuf,
    },

    /// The path exists but is a file.
    #[error("{path} is not a directory")]
    NotADirectory {
        /// The configured path.
        path: PathBuf,
    },

    /// Any other I/O failure, usually permissions.
    #[error("failed to read {path}")]
    Io {
        /// The configured path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl SnapshotError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => SnapshotError::NotFound {
                path: path.to_path_buf(),
            },
            _ => SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}
