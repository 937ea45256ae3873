use std::fs::{self, File};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use stallguard_core::{
    DirectoryWatch, MonitoredDirectory, WatchConfig, WatchError, WatchEvent,
    WatchObserver,
};
use tempfile::TempDir;

fn collect_until(
    watch: &mut DirectoryWatch,
    mut done: impl FnMut(&[WatchEvent]) -> bool,
) -> Vec<WatchEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    while Instant::now() < deadline && !done(&seen) {
        if let Ok(events) = watch.poll(Duration::from_millis(100)) {
            seen.extend(events);
        }
    }
    seen
}

#[test]
fn reports_creation_rename_and_deletion() {
    let dir = TempDir::new().unwrap();
    let mut watch = DirectoryWatch::start(
        &MonitoredDirectory::new(dir.path()),
        WatchConfig::default(),
    )
    .unwrap();

    File::create(dir.path().join("a.txt")).unwrap();
    let seen = collect_until(&mut watch, |seen| {
        seen.contains(&WatchEvent::Created { name: "a.txt".into() })
    });
    assert!(
        seen.contains(&WatchEvent::Created { name: "a.txt".into() }),
        "no creation in {seen:?}"
    );

    fs::rename(dir.path().join("a.txt"), dir.path().join("b.txt")).unwrap();
    let renamed = WatchEvent::Renamed {
        from: "a.txt".into(),
        to: "b.txt".into(),
    };
    let seen = collect_until(&mut watch, |seen| seen.contains(&renamed));
    assert!(seen.contains(&renamed), "no rename in {seen:?}");

    fs::remove_file(dir.path().join("b.txt")).unwrap();
    let seen = collect_until(&mut watch, |seen| {
        seen.contains(&WatchEvent::Deleted { name: "b.txt".into() })
    });
    assert!(
        seen.contains(&WatchEvent::Deleted { name: "b.txt".into() }),
        "no deletion in {seen:?}"
    );
}

#[test]
fn missing_directory_cannot_be_watched() {
    let dir = TempDir::new().unwrap();
    let err = DirectoryWatch::start(
        &MonitoredDirectory::new(dir.path().join("gone")),
        WatchConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, WatchError::PathUnavailable { .. }));
}

#[derive(Debug)]
enum Seen {
    Started,
    Recheck,
    Event(WatchEvent),
}

/// Forwards everything the loop reports to the test thread.
#[derive(Debug)]
struct Forward(Sender<Seen>);

impl WatchObserver for Forward {
    fn on_event(&mut self, event: &WatchEvent) {
        let _ = self.0.send(Seen::Event(event.clone()));
    }

    fn on_recheck(&mut self) {
        let _ = self.0.send(Seen::Recheck);
    }
}

#[test]
fn recheck_runs_at_startup_and_on_interval_while_events_arrive() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let (tx, rx) = mpsc::channel();

    // The loop never returns; the thread is left behind when the test ends.
    thread::spawn(move || {
        let config = WatchConfig {
            recheck_interval: Some(Duration::from_millis(200)),
            idle_tick: Duration::from_millis(50),
        };
        let watch =
            DirectoryWatch::start(&MonitoredDirectory::new(&root), config)
                .unwrap();
        tx.send(Seen::Started).unwrap();
        let _ = watch.run(&mut Forward(tx));
    });

    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(first, Seen::Started), "got {first:?}");
    let startup = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(
        matches!(startup, Seen::Recheck),
        "first callback should be the startup check, got {startup:?}"
    );

    let mut rechecks = 0;
    let mut created = 0;
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut next_file = 0;
    while Instant::now() < deadline && (rechecks < 3 || created == 0) {
        File::create(dir.path().join(format!("f{next_file}.txt"))).unwrap();
        next_file += 1;
        while let Ok(seen) = rx.recv_timeout(Duration::from_millis(100)) {
            match seen {
                Seen::Recheck => rechecks += 1,
                Seen::Event(WatchEvent::Created { .. }) => created += 1,
                _ => {}
            }
        }
    }

    assert!(rechecks >= 3, "only {rechecks} interval rechecks");
    assert!(created > 0, "no creation events alongside rechecks");
}

#[test]
fn without_interval_no_recheck_happens() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let watch = DirectoryWatch::start(
            &MonitoredDirectory::new(&root),
            WatchConfig {
                recheck_interval: None,
                idle_tick: Duration::from_millis(50),
            },
        )
        .unwrap();
        tx.send(Seen::Started).unwrap();
        let _ = watch.run(&mut Forward(tx));
    });

    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        Seen::Started
    ));
    File::create(dir.path().join("only.txt")).unwrap();

    let deadline = Instant::now() + Duration::from_millis(800);
    while Instant::now() < deadline {
        if let Ok(seen) = rx.recv_timeout(Duration::from_millis(50)) {
            assert!(!matches!(seen, Seen::Recheck), "unexpected recheck");
        }
    }
}
