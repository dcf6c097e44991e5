use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};

use crate::classify::mount_point_from_entry;
use crate::model::{MountPoint, MountReport, MountStatus, StatusTransition, Transport};
use crate::pool::{run_jobs, JobOutcome};
use crate::probe::{FsProbe, PathProbe, ProbeError, ProbeOutcome};
use crate::settings::Settings;
use crate::table::{MountTableSource, SystemTable};

const TRANSITION_RING_CAPACITY: usize = 256;

/// Authoritative owner of the known mount set. All probing happens outside
/// the map lock; readers always observe a mount entry entirely pre- or
/// post-update. Cloning shares the underlying state, which is how the
/// monitor thread gets its handle.
#[derive(Clone)]
pub struct MountRegistry {
    settings: Settings,
    mounts: Arc<Mutex<HashMap<String, MountPoint>>>,
    transitions: Arc<Mutex<TransitionRing>>,
    table: Arc<dyn MountTableSource>,
    prober: Arc<dyn PathProbe>,
    monitor_active: Arc<AtomicBool>,
    monitor: Arc<Mutex<Option<MonitorHandle>>>,
}

struct MonitorHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct TransitionRing {
    next_seq: u64,
    events: VecDeque<StatusTransition>,
}

impl TransitionRing {
    fn push(&mut self, path: &str, previous: MountStatus, current: MountStatus) {
        self.next_seq += 1;
        if self.events.len() == TRANSITION_RING_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(StatusTransition {
            seq: self.next_seq,
            path: path.to_string(),
            previous,
            current,
            at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }
}

impl MountRegistry {
    pub fn new(settings: Settings) -> Self {
        let prober = Arc::new(FsProbe::from_settings(&settings));
        Self::with_sources(settings, Arc::new(SystemTable), prober)
    }

    pub fn with_sources(
        settings: Settings,
        table: Arc<dyn MountTableSource>,
        prober: Arc<dyn PathProbe>,
    ) -> Self {
        Self {
            settings,
            mounts: Arc::new(Mutex::new(HashMap::new())),
            transitions: Arc::new(Mutex::new(TransitionRing::default())),
            table,
            prober,
            monitor_active: Arc::new(AtomicBool::new(false)),
            monitor: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Enumerates the OS mount table, classifies and probes every entry, and
    /// atomically replaces the known set. Entries the OS still lists but
    /// whose path is gone stay in the set as `unavailable`.
    pub fn discover(&self) -> Result<Vec<MountPoint>> {
        let entries = self.table.entries();
        let mut next = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.path.is_empty() {
                warn!("skipping mount entry with empty path (device {})", entry.device);
                continue;
            }
            let mut mount = mount_point_from_entry(entry);
            let outcome = self.prober.probe(Path::new(&mount.path));
            apply_outcome(&mut mount, outcome);
            debug!(
                "discovered mount {} ({}, {})",
                mount.path, mount.transport, mount.status
            );
            next.insert(mount.path.clone(), mount);
        }
        info!("mount discovery found {} mount(s)", next.len());

        let mut guard = self.lock_mounts()?;
        *guard = next;
        let mut mounts: Vec<MountPoint> = guard.values().cloned().collect();
        drop(guard);
        mounts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(mounts)
    }

    /// Re-probes one path, updating the registry entry in place. Unknown
    /// paths trigger a discovery first; a path the OS does not list at all
    /// yields a synthesized unavailable placeholder that is not stored.
    pub fn check(&self, path: &str) -> Result<MountPoint> {
        let known = { self.lock_mounts()?.contains_key(path) };
        if !known {
            self.discover()?;
            let still_unknown = { !self.lock_mounts()?.contains_key(path) };
            if still_unknown {
                debug!("check for unregistered path {path}");
                return Ok(placeholder_mount(path));
            }
        }

        let outcome = self.prober.probe(Path::new(path));
        let mut guard = self.lock_mounts()?;
        let Some(entry) = guard.get_mut(path) else {
            // A concurrent discovery dropped the entry between probe and update.
            return Ok(placeholder_mount(path));
        };
        apply_outcome(entry, outcome);
        Ok(entry.clone())
    }

    /// Resolves which mount contains `path`: longest boundary-aware prefix
    /// against the known set first, then a device-id comparison against the
    /// live OS table for paths outside every known mount.
    pub fn find_mount_for_path(&self, path: &str) -> Result<Option<String>> {
        let known: Vec<String> = { self.lock_mounts()?.keys().cloned().collect() };
        let mut best: Option<String> = None;
        for mount in known {
            if path_is_under(path, &mount)
                && best.as_ref().map_or(true, |current| mount.len() > current.len())
            {
                best = Some(mount);
            }
        }
        if best.is_some() {
            return Ok(best);
        }
        Ok(self.find_mount_by_device(path))
    }

    #[cfg(unix)]
    fn find_mount_by_device(&self, path: &str) -> Option<String> {
        let target = device_id(Path::new(path))?;
        let mut best: Option<String> = None;
        for entry in self.table.entries() {
            if device_id(Path::new(&entry.path)) == Some(target)
                && best.as_ref().map_or(true, |current| entry.path.len() > current.len())
            {
                best = Some(entry.path);
            }
        }
        best
    }

    #[cfg(not(unix))]
    fn find_mount_by_device(&self, _path: &str) -> Option<String> {
        None
    }

    /// Snapshot of the known set, sorted by path. Does not probe.
    pub fn mounts(&self) -> Result<Vec<MountPoint>> {
        let mut mounts: Vec<MountPoint> = self.lock_mounts()?.values().cloned().collect();
        mounts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(mounts)
    }

    pub fn report(&self) -> Result<MountReport> {
        let mounts = self.mounts()?;
        let mut report = MountReport {
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            total_mounts: mounts.len() as u64,
            ..MountReport::default()
        };
        for mount in &mounts {
            match mount.status {
                MountStatus::Healthy => report.healthy_mounts += 1,
                MountStatus::Degraded => report.degraded_mounts += 1,
                MountStatus::Unavailable => report.unavailable_mounts += 1,
                MountStatus::Unknown => report.unknown_mounts += 1,
            }
            // Anything that is not a network transport counts as local, so
            // the two counters partition the total.
            if mount.is_network() {
                report.network_mounts += 1;
            } else {
                report.local_mounts += 1;
            }
        }
        report.mounts = mounts;
        Ok(report)
    }

    /// Transition events with `seq` greater than `from_seq`, oldest first.
    pub fn transitions_since(&self, from_seq: u64) -> Result<Vec<StatusTransition>> {
        let ring = self.lock_transitions()?;
        Ok(ring
            .events
            .iter()
            .filter(|event| event.seq > from_seq)
            .cloned()
            .collect())
    }

    pub fn monitoring_active(&self) -> bool {
        self.monitor_active.load(Ordering::SeqCst)
    }

    /// Starts the background polling loop. No-op when already running;
    /// returns whether a new loop was started.
    pub fn start_monitoring(&self, interval: Option<Duration>) -> Result<bool> {
        let mut slot = self.lock_monitor()?;
        if slot.is_some() {
            debug!("mount monitoring already running");
            return Ok(false);
        }
        let interval = interval.unwrap_or_else(|| self.settings.check_interval());
        let (stop_tx, stop_rx) = mpsc::channel();
        self.monitor_active.store(true, Ordering::SeqCst);
        let worker = self.clone();
        let thread = thread::spawn(move || worker.monitor_loop(interval, stop_rx));
        *slot = Some(MonitorHandle { stop_tx, thread });
        info!("mount monitoring started (interval {}s)", interval.as_secs());
        Ok(true)
    }

    /// Signals the loop and waits up to the configured join timeout. A loop
    /// that fails to exit in time is detached; it can never block shutdown.
    pub fn stop_monitoring(&self) -> Result<bool> {
        let handle = { self.lock_monitor()?.take() };
        let Some(MonitorHandle { stop_tx, thread }) = handle else {
            return Ok(false);
        };
        self.monitor_active.store(false, Ordering::SeqCst);
        let _ = stop_tx.send(());

        let deadline = Instant::now() + self.settings.join_timeout();
        while !thread.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if thread.is_finished() {
            let _ = thread.join();
            info!("mount monitoring stopped");
        } else {
            warn!(
                "mount monitor did not stop within {}s; detaching",
                self.settings.join_timeout_secs
            );
        }
        Ok(true)
    }

    fn monitor_loop(&self, interval: Duration, stop_rx: Receiver<()>) {
        debug!("mount monitor loop running");
        loop {
            if !self.monitor_active.load(Ordering::SeqCst) {
                break;
            }
            self.monitor_tick();
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("mount monitor loop exited");
    }

    fn monitor_tick(&self) {
        let paths: Vec<String> = match self.lock_mounts() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(err) => {
                warn!("monitor tick skipped: {err}");
                return;
            }
        };
        if paths.is_empty() {
            return;
        }

        let jobs = paths
            .into_iter()
            .map(|path| {
                let prober = Arc::clone(&self.prober);
                let probe_path = path.clone();
                let run: Box<dyn FnOnce() -> ProbeOutcome + Send> =
                    Box::new(move || prober.probe(Path::new(&probe_path)));
                (path, run)
            })
            .collect();

        let timeout = self.settings.mount_check_timeout();
        for (path, outcome) in run_jobs(jobs, self.settings.monitor_workers, timeout) {
            let outcome = match outcome {
                JobOutcome::Completed(outcome) => outcome,
                JobOutcome::Panicked(message) => {
                    ProbeOutcome::unavailable(ProbeError::Failure(message).to_string())
                }
                JobOutcome::TimedOut => ProbeOutcome::unavailable(
                    ProbeError::Timeout(self.settings.mount_check_timeout_secs).to_string(),
                ),
            };
            if let Err(err) = self.apply_tick_outcome(&path, outcome) {
                warn!("monitor update failed for {path}: {err}");
            }
        }
    }

    fn apply_tick_outcome(&self, path: &str, outcome: ProbeOutcome) -> Result<()> {
        let transition = {
            let mut guard = self.lock_mounts()?;
            let Some(entry) = guard.get_mut(path) else {
                return Ok(());
            };
            let previous = entry.status;
            apply_outcome(entry, outcome);
            (previous != entry.status).then_some((previous, entry.status))
        };
        if let Some((previous, current)) = transition {
            info!("Mount {path} status changed: {previous} -> {current}");
            self.lock_transitions()?.push(path, previous, current);
        }
        Ok(())
    }

    fn lock_mounts(&self) -> Result<MutexGuard<'_, HashMap<String, MountPoint>>> {
        self.mounts
            .lock()
            .map_err(|_| anyhow!("mount registry lock poisoned"))
    }

    fn lock_transitions(&self) -> Result<MutexGuard<'_, TransitionRing>> {
        self.transitions
            .lock()
            .map_err(|_| anyhow!("transition log lock poisoned"))
    }

    fn lock_monitor(&self) -> Result<MutexGuard<'_, Option<MonitorHandle>>> {
        self.monitor
            .lock()
            .map_err(|_| anyhow!("monitor handle lock poisoned"))
    }
}

fn apply_outcome(mount: &mut MountPoint, outcome: ProbeOutcome) {
    mount.status = outcome.status;
    mount.latency_ms = outcome.latency_ms;
    mount.error = outcome.error;
    mount.last_checked = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
}

fn placeholder_mount(path: &str) -> MountPoint {
    MountPoint {
        path: path.to_string(),
        transport: Transport::Unknown,
        device: "unknown".to_string(),
        filesystem: "unknown".to_string(),
        options: Vec::new(),
        status: MountStatus::Unavailable,
        last_checked: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        latency_ms: None,
        error: Some("Mount point not found".to_string()),
    }
}

fn path_is_under(path: &str, mount: &str) -> bool {
    if mount == "/" {
        return path.starts_with('/');
    }
    path == mount || path.starts_with(&format!("{mount}/"))
}

#[cfg(unix)]
fn device_id(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(path).ok().map(|meta| meta.dev())
}
