use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mount_medic_core::probe::classify_io_error;
use mount_medic_core::{
    MountRegistry, MountStatus, MountTableSource, PathProbe, ProbeOutcome, RawMountEntry,
    Settings, Transport,
};

struct SwappableTable {
    entries: Mutex<Vec<RawMountEntry>>,
}

impl SwappableTable {
    fn new(entries: Vec<RawMountEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn set(&self, entries: Vec<RawMountEntry>) {
        *self.entries.lock().expect("table lock") = entries;
    }
}

impl MountTableSource for SwappableTable {
    fn entries(&self) -> Vec<RawMountEntry> {
        self.entries.lock().expect("table lock").clone()
    }
}

struct SequenceProbe {
    outcomes: Mutex<HashMap<String, Vec<ProbeOutcome>>>,
}

impl SequenceProbe {
    fn new(outcomes: HashMap<String, Vec<ProbeOutcome>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
        }
    }
}

impl PathProbe for SequenceProbe {
    fn probe(&self, path: &Path) -> ProbeOutcome {
        let mut guard = self.outcomes.lock().expect("probe lock");
        match guard.get_mut(path.to_string_lossy().as_ref()) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue
                .first()
                .cloned()
                .unwrap_or_else(|| ProbeOutcome::unavailable("unscripted probe")),
            None => ProbeOutcome::unavailable("unscripted probe"),
        }
    }
}

fn entry(device: &str, path: &str, filesystem: &str) -> RawMountEntry {
    RawMountEntry {
        device: device.to_string(),
        path: path.to_string(),
        filesystem: filesystem.to_string(),
        options: vec!["rw".to_string()],
    }
}

fn registry_with(
    table: Arc<SwappableTable>,
    outcomes: HashMap<String, Vec<ProbeOutcome>>,
) -> MountRegistry {
    let settings = Settings {
        join_timeout_secs: 2,
        ..Settings::default()
    };
    MountRegistry::with_sources(settings, table, Arc::new(SequenceProbe::new(outcomes)))
}

fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(25));
    }
    panic!("timed out waiting for {what}");
}

#[test]
fn slow_mount_emits_exactly_one_transition() {
    let table = Arc::new(SwappableTable::new(vec![entry(
        "server:/vol",
        "/data",
        "nfs4",
    )]));
    let outcomes = HashMap::from([(
        "/data".to_string(),
        vec![
            ProbeOutcome::healthy(3),
            ProbeOutcome::degraded(Some(1500), "Very slow response: 1500ms"),
        ],
    )]);
    let registry = registry_with(table, outcomes);

    let mounts = registry.discover().expect("discover");
    assert_eq!(mounts[0].transport, Transport::Nfs);
    assert_eq!(mounts[0].status, MountStatus::Healthy);

    registry
        .start_monitoring(Some(Duration::from_millis(10)))
        .expect("start");
    wait_for("the degraded transition", || {
        !registry.transitions_since(0).expect("transitions").is_empty()
    });
    registry.stop_monitoring().expect("stop");

    let transitions = registry.transitions_since(0).expect("transitions");
    assert_eq!(
        transitions.len(),
        1,
        "repeated degraded probes must not log repeat transitions: {transitions:?}"
    );
    assert_eq!(transitions[0].seq, 1);
    assert_eq!(transitions[0].path, "/data");
    assert_eq!(transitions[0].previous, MountStatus::Healthy);
    assert_eq!(transitions[0].current, MountStatus::Degraded);

    let snapshot = registry.mounts().expect("snapshot");
    assert_eq!(snapshot[0].status, MountStatus::Degraded);
    assert_eq!(snapshot[0].latency_ms, Some(1500));
    assert_eq!(snapshot[0].error.as_deref(), Some("Very slow response: 1500ms"));

    assert!(registry.transitions_since(1).expect("transitions").is_empty());
}

#[test]
fn host_down_errors_surface_as_unreachable() {
    let err = io::Error::new(io::ErrorKind::Other, "Host is down (os error 112)");
    let mapped = classify_io_error(&err);
    assert_eq!(mapped.to_string(), "Network host unreachable");

    let table = Arc::new(SwappableTable::new(vec![entry(
        "server:/vol",
        "/mnt/share",
        "nfs",
    )]));
    let outcomes = HashMap::from([(
        "/mnt/share".to_string(),
        vec![
            ProbeOutcome::healthy(5),
            ProbeOutcome::unavailable(mapped.to_string()),
        ],
    )]);
    let registry = registry_with(table, outcomes);
    registry.discover().expect("discover");

    registry
        .start_monitoring(Some(Duration::from_millis(10)))
        .expect("start");
    wait_for("the unavailable transition", || {
        !registry.transitions_since(0).expect("transitions").is_empty()
    });
    registry.stop_monitoring().expect("stop");

    let snapshot = registry.mounts().expect("snapshot");
    assert_eq!(snapshot[0].status, MountStatus::Unavailable);
    assert_eq!(snapshot[0].error.as_deref(), Some("Network host unreachable"));

    let transitions = registry.transitions_since(0).expect("transitions");
    assert_eq!(transitions[0].previous, MountStatus::Healthy);
    assert_eq!(transitions[0].current, MountStatus::Unavailable);
}

#[test]
fn stop_monitoring_returns_within_the_join_timeout() {
    let table = Arc::new(SwappableTable::new(vec![entry("/dev/sda1", "/", "ext4")]));
    let outcomes = HashMap::from([("/".to_string(), vec![ProbeOutcome::healthy(1)])]);
    let registry = registry_with(table, outcomes);
    registry.discover().expect("discover");

    // A huge interval parks the loop in its channel wait; stop must wake it.
    registry
        .start_monitoring(Some(Duration::from_secs(3600)))
        .expect("start");
    let started = Instant::now();
    assert!(registry.stop_monitoring().expect("stop"));
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "stop took {:?}",
        started.elapsed()
    );
    assert!(!registry.monitoring_active());
    assert!(!registry.stop_monitoring().expect("repeat stop"));
}

#[test]
fn discovery_replaces_entries_the_table_dropped() {
    let table = Arc::new(SwappableTable::new(vec![
        entry("/dev/sda1", "/", "ext4"),
        entry("host:/vol", "/mnt/a", "nfs"),
    ]));
    let outcomes = HashMap::from([
        ("/".to_string(), vec![ProbeOutcome::healthy(1)]),
        ("/mnt/a".to_string(), vec![ProbeOutcome::healthy(2)]),
    ]);
    let registry = registry_with(Arc::clone(&table), outcomes);
    assert_eq!(registry.discover().expect("discover").len(), 2);

    table.set(vec![entry("/dev/sda1", "/", "ext4")]);
    let mounts = registry.discover().expect("second discover");
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].path, "/");
    assert!(registry
        .mounts()
        .expect("snapshot")
        .iter()
        .all(|mount| mount.path != "/mnt/a"));
}
