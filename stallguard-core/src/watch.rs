//! Live watch mode for the monitored directory.
//!
//! A thin wrapper around `notify`: the backend thread pushes raw
//! notifications into a single channel and the calling thread drains it,
//! turning each notification into zero or more [`WatchEvent`]s for a
//! [`WatchObserver`]. Only creations, deletions and renames are surfaced.
//!
//! Backends disagree on how renames arrive. inotify sends a `From` half, a
//! `To` half and then a combined `Both`; other backends send only the
//! halves. Halves are paired by tracker cookie and the combined event is
//! dropped when the halves already produced the rename. A `From` that
//! never finds its `To` is a file moved out of the directory and is
//! reported as a deletion once it goes stale; a `To` without a `From` is a
//! file moved in and is reported as a creation.

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::snapshot::{MonitoredDirectory, SnapshotError};

/// A filesystem change worth logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file appeared, by creation or by being moved in.
    Created {
        /// Name relative to the monitored directory.
        name: String,
    },
    /// A file went away, by deletion or by being moved out.
    Deleted {
        /// Name relative to the monitored directory.
        name: String,
    },
    /// A file was renamed within the directory.
    Renamed {
        /// Previous name.
        from: String,
        /// New name.
        to: String,
    },
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEvent::Created { name } => write!(f, "File Created: {name}"),
            WatchEvent::Deleted { name } => write!(f, "File Deleted: {name}"),
            WatchEvent::Renamed { from, to } => {
                write!(f, "File Renamed: {from} -> {to}")
            }
        }
    }
}

/// Configuration knobs for the watch loop.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Run the batch check this often while watching. `None` keeps watch
    /// mode logging-only.
    pub recheck_interval: Option<Duration>,
    /// How long the loop waits for a notification before doing
    /// housekeeping. Also the grace period for pairing rename halves.
    pub idle_tick: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            recheck_interval: None,
            idle_tick: Duration::from_millis(500),
        }
    }
}

/// Receives everything the watch loop observes.
pub trait WatchObserver {
    /// Called once per translated notification.
    fn on_event(&mut self, event: &WatchEvent);

    /// Called at startup and then every `recheck_interval`, when one is
    /// configured.
    fn on_recheck(&mut self) {}

    /// Called for backend errors the loop survives.
    fn on_error(&mut self, error: &WatchError) {
        warn!("watch error: {error}");
    }
}

/// Observer that writes each event to the log.
#[derive(Debug, Default)]
pub struct LogObserver;

impl WatchObserver for LogObserver {
    fn on_event(&mut self, event: &WatchEvent) {
        info!("{event}");
    }
}

/// Failures starting or running the watch loop.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The directory failed its availability check.
    #[error("monitored directory {path} is unavailable")]
    PathUnavailable {
        /// The configured path.
        path: PathBuf,
        /// Why it is unavailable.
        #[source]
        source: SnapshotError,
    },

    /// The backend refused the subscription.
    #[error("failed to watch {path}")]
    Subscribe {
        /// The resolved path.
        path: PathBuf,
        /// Backend error.
        #[source]
        source: notify::Error,
    },

    /// A notification arrived as an error.
    #[error("filesystem watcher reported an error")]
    Backend(#[source] notify::Error),

    /// The backend thread dropped its sender.
    #[error("filesystem event channel closed")]
    Disconnected,
}

/// An active subscription on the monitored directory.
pub struct DirectoryWatch {
    root: PathBuf,
    // Dropping the watcher ends the subscription.
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    renames: RenameTracker,
    config: WatchConfig,
}

impl fmt::Debug for DirectoryWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryWatch")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("pending_renames", &self.renames.pending.len())
            .finish()
    }
}

impl DirectoryWatch {
    /// Subscribe to create, delete and rename notifications.
    pub fn start(
        directory: &MonitoredDirectory,
        config: WatchConfig,
    ) -> Result<Self, WatchError> {
        directory
            .check()
            .map_err(|source| WatchError::PathUnavailable {
                path: directory.path().to_path_buf(),
                source,
            })?;

        // Backends report absolute, resolved paths; watch the same form so
        // names can be made relative again.
        let root = directory
            .path()
            .canonicalize()
            .unwrap_or_else(|_| directory.path().to_path_buf());

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).map_err(|source| {
            WatchError::Subscribe {
                path: root.clone(),
                source,
            }
        })?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Subscribe {
                path: root.clone(),
                source,
            })?;

        info!(path = %root.display(), "starting directory watcher");

        Ok(Self {
            root,
            _watcher: watcher,
            rx,
            renames: RenameTracker::default(),
            config,
        })
    }

    /// The resolved directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait up to `timeout` for one notification and translate it.
    ///
    /// An empty result means the wait timed out (stale rename halves may
    /// still be flushed as deletions) or the notification was not one we
    /// report.
    pub fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Vec<WatchEvent>, WatchError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                debug!(
                    kind = ?event.kind,
                    paths = event.paths.len(),
                    "raw fs event"
                );
                Ok(self.renames.classify(&self.root, event, Instant::now()))
            }
            Ok(Err(err)) => Err(WatchError::Backend(err)),
            Err(RecvTimeoutError::Timeout) => Ok(self.renames.expire(
                &self.root,
                Instant::now(),
                self.config.idle_tick,
            )),
            Err(RecvTimeoutError::Disconnected) => {
                Err(WatchError::Disconnected)
            }
        }
    }

    /// Block the calling thread for the lifetime of the process, feeding
    /// every event to `observer`. Only returns if the backend goes away.
    pub fn run<O: WatchObserver + ?Sized>(
        mut self,
        observer: &mut O,
    ) -> Result<Infallible, WatchError> {
        let mut next_recheck = self.config.recheck_interval.map(|interval| {
            observer.on_recheck();
            Instant::now() + interval
        });

        loop {
            let wait = match next_recheck {
                Some(due) => due
                    .saturating_duration_since(Instant::now())
                    .min(self.config.idle_tick),
                None => self.config.idle_tick,
            };

            match self.poll(wait) {
                Ok(events) => {
                    for event in &events {
                        observer.on_event(event);
                    }
                }
                Err(WatchError::Disconnected) => {
                    return Err(WatchError::Disconnected);
                }
                Err(err) => observer.on_error(&err),
            }

            if let (Some(due), Some(interval)) =
                (next_recheck, self.config.recheck_interval)
                && Instant::now() >= due
            {
                observer.on_recheck();
                next_recheck = Some(Instant::now() + interval);
            }
        }
    }
}

#[derive(Debug)]
struct PendingFrom {
    tracker: Option<usize>,
    path: PathBuf,
    seen: Instant,
}

#[derive(Debug)]
struct ReportedRename {
    from: PathBuf,
    to: PathBuf,
    seen: Instant,
}

#[derive(Debug, Default)]
struct RenameTracker {
    pending: Vec<PendingFrom>,
    reported: Vec<ReportedRename>,
}

impl RenameTracker {
    fn classify(
        &mut self,
        root: &Path,
        event: Event,
        now: Instant,
    ) -> Vec<WatchEvent> {
        let name = |path: &Path| relative_name(root, path);

        match event.kind {
            EventKind::Create(_) => event
                .paths
                .iter()
                .map(|path| WatchEvent::Created { name: name(path) })
                .collect(),
            EventKind::Remove(_) => event
                .paths
                .iter()
                .map(|path| WatchEvent::Deleted { name: name(path) })
                .collect(),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let [from, to, ..] = event.paths.as_slice() else {
                    return Vec::new();
                };
                self.pending.retain(|pending| &pending.path != from);
                if let Some(idx) = self
                    .reported
                    .iter()
                    .position(|seen| &seen.from == from && &seen.to == to)
                {
                    self.reported.swap_remove(idx);
                    return Vec::new();
                }
                vec![WatchEvent::Renamed {
                    from: name(from),
                    to: name(to),
                }]
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                if let Some(path) = event.paths.first() {
                    self.pending.push(PendingFrom {
                        tracker: event.attrs.tracker(),
                        path: path.clone(),
                        seen: now,
                    });
                }
                Vec::new()
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(to) = event.paths.first() else {
                    return Vec::new();
                };
                match self.take_pending(event.attrs.tracker()) {
                    Some(from) => {
                        let renamed = WatchEvent::Renamed {
                            from: name(&from),
                            to: name(to),
                        };
                        self.reported.push(ReportedRename {
                            from,
                            to: to.clone(),
                            seen: now,
                        });
                        vec![renamed]
                    }
                    None => vec![WatchEvent::Created { name: name(to) }],
                }
            }
            // Rename halves with no direction: whichever side still exists
            // is the destination.
            EventKind::Modify(ModifyKind::Name(_)) => event
                .paths
                .iter()
                .map(|path| {
                    if path.exists() {
                        WatchEvent::Created { name: name(path) }
                    } else {
                        WatchEvent::Deleted { name: name(path) }
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn take_pending(&mut self, tracker: Option<usize>) -> Option<PathBuf> {
        let idx = match tracker {
            Some(cookie) => self
                .pending
                .iter()
                .position(|pending| pending.tracker == Some(cookie)),
            None => self
                .pending
                .iter()
                .rposition(|pending| pending.tracker.is_none()),
        }?;
        Some(self.pending.remove(idx).path)
    }

    /// Flush `From` halves that never found a partner as deletions.
    fn expire(
        &mut self,
        root: &Path,
        now: Instant,
        grace: Duration,
    ) -> Vec<WatchEvent> {
        let is_stale =
            |seen: Instant| now.saturating_duration_since(seen) >= grace;

        self.reported.retain(|seen| !is_stale(seen.seen));

        let mut expired = Vec::new();
        self.pending.retain(|pending| {
            if is_stale(pending.seen) {
                expired.push(WatchEvent::Deleted {
                    name: relative_name(root, &pending.path),
                });
                false
            } else {
                true
            }
        });
        expired
    }
}

fn relative_name(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
        _ => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn root() -> PathBuf {
        PathBuf::from("/srv/inbound")
    }

    fn event(kind: EventKind, names: &[&str]) -> Event {
        names
            .iter()
            .fold(Event::new(kind), |ev, name| ev.add_path(root().join(name)))
    }

    fn rename(
        mode: RenameMode,
        names: &[&str],
        cookie: Option<usize>,
    ) -> Event {
        let ev = event(EventKind::Modify(ModifyKind::Name(mode)), names);
        match cookie {
            Some(cookie) => ev.set_tracker(cookie),
            None => ev,
        }
    }

    #[test]
    fn create_and_remove_map_directly() {
        let mut tracker = RenameTracker::default();
        let now = Instant::now();

        assert_eq!(
            tracker.classify(
                &root(),
                event(EventKind::Create(CreateKind::File), &["a.csv"]),
                now
            ),
            vec![WatchEvent::Created { name: "a.csv".into() }]
        );
        assert_eq!(
            tracker.classify(
                &root(),
                event(EventKind::Remove(RemoveKind::File), &["a.csv"]),
                now
            ),
            vec![WatchEvent::Deleted { name: "a.csv".into() }]
        );
    }

    #[test]
    fn content_changes_are_ignored() {
        let mut tracker = RenameTracker::default();
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["a.csv"],
        );
        assert!(tracker.classify(&root(), ev, Instant::now()).is_empty());
    }

    #[test]
    fn inotify_style_rename_reports_once() {
        let mut tracker = RenameTracker::default();
        let now = Instant::now();

        let from = tracker.classify(
            &root(),
            rename(RenameMode::From, &["old.csv"], Some(7)),
            now,
        );
        let to = tracker.classify(
            &root(),
            rename(RenameMode::To, &["new.csv"], Some(7)),
            now,
        );
        let both = tracker.classify(
            &root(),
            rename(RenameMode::Both, &["old.csv", "new.csv"], Some(7)),
            now,
        );

        assert!(from.is_empty());
        assert_eq!(
            to,
            vec![WatchEvent::Renamed {
                from: "old.csv".into(),
                to: "new.csv".into()
            }]
        );
        assert!(both.is_empty());
        assert!(tracker.pending.is_empty());
        assert!(tracker.reported.is_empty());
    }

    #[test]
    fn combined_rename_alone_is_reported() {
        let mut tracker = RenameTracker::default();
        let out = tracker.classify(
            &root(),
            rename(RenameMode::Both, &["a", "b"], None),
            Instant::now(),
        );
        assert_eq!(
            out,
            vec![WatchEvent::Renamed {
                from: "a".into(),
                to: "b".into()
            }]
        );
    }

    #[test]
    fn halves_without_cookies_pair_in_order() {
        let mut tracker = RenameTracker::default();
        let now = Instant::now();
        tracker.classify(&root(), rename(RenameMode::From, &["x"], None), now);
        let out = tracker.classify(
            &root(),
            rename(RenameMode::To, &["y"], None),
            now,
        );
        assert_eq!(
            out,
            vec![WatchEvent::Renamed {
                from: "x".into(),
                to: "y".into()
            }]
        );
    }

    #[test]
    fn unpaired_to_is_a_creation() {
        let mut tracker = RenameTracker::default();
        let out = tracker.classify(
            &root(),
            rename(RenameMode::To, &["arrived.csv"], Some(3)),
            Instant::now(),
        );
        assert_eq!(
            out,
            vec![WatchEvent::Created {
                name: "arrived.csv".into()
            }]
        );
    }

    #[test]
    fn stale_from_becomes_a_deletion() {
        let mut tracker = RenameTracker::default();
        let start = Instant::now();
        tracker.classify(
            &root(),
            rename(RenameMode::From, &["gone.csv"], Some(11)),
            start,
        );

        let grace = Duration::from_millis(500);
        assert!(tracker.expire(&root(), start, grace).is_empty());
        assert_eq!(
            tracker.expire(&root(), start + grace, grace),
            vec![WatchEvent::Deleted { name: "gone.csv".into() }]
        );
        assert!(tracker.pending.is_empty());
    }

    #[test]
    fn display_matches_log_format() {
        assert_eq!(
            WatchEvent::Created { name: "a".into() }.to_string(),
            "File Created: a"
        );
        assert_eq!(
            WatchEvent::Deleted { name: "a".into() }.to_string(),
            "File Deleted: a"
        );
        assert_eq!(
            WatchEvent::Renamed {
                from: "a".into(),
                to: "b".into()
            }
            .to_string(),
            "File Renamed: a -> b"
        );
    }

    #[test]
    fn names_outside_root_fall_back_to_file_name() {
        assert_eq!(
            relative_name(&root(), Path::new("/elsewhere/file.txt")),
            "file.txt"
        );
        assert_eq!(relative_name(&root(), &root().join("x.txt")), "x.txt");
    }
}
