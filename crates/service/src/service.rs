use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mount_medic_core::{
    attempt_mount, render_markdown_summary, DiagnosticsContext, HealthCategory, HealthChecker,
    HealthReport, MountPoint, MountReport, Settings, StatusTransition,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthRunRequest {
    /// Empty means every category.
    #[serde(default)]
    pub categories: Vec<HealthCategory>,
    #[serde(default)]
    pub parallel: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorStatus {
    pub active: bool,
    pub known_mounts: u64,
    pub last_transition_seq: u64,
}

/// Facade the embedding layers talk to. Owns one context and one orchestrator
/// for the lifetime of the process; everything else is per-call.
pub struct HealthService {
    ctx: Arc<DiagnosticsContext>,
    checker: HealthChecker,
}

impl HealthService {
    pub fn new(settings: Settings) -> Result<Self> {
        Self::with_context(Arc::new(DiagnosticsContext::new(settings)))
    }

    pub fn with_context(ctx: Arc<DiagnosticsContext>) -> Result<Self> {
        let checker = HealthChecker::with_builtin_checks(Arc::clone(&ctx))?;
        Ok(Self { ctx, checker })
    }

    pub fn context(&self) -> &Arc<DiagnosticsContext> {
        &self.ctx
    }

    pub fn discover_mounts(&self) -> Result<Vec<MountPoint>> {
        self.ctx.registry.discover()
    }

    pub fn check_path(&self, path: &str) -> Result<MountPoint> {
        self.ctx.registry.check(path)
    }

    pub fn remount(&self, path: &str) -> Result<bool> {
        attempt_mount(&self.ctx.registry, path)
    }

    pub fn run_health(&self, request: &HealthRunRequest) -> HealthReport {
        let categories: Option<&[HealthCategory]> = if request.categories.is_empty() {
            None
        } else {
            Some(request.categories.as_slice())
        };
        self.checker.run(categories, request.parallel)
    }

    pub fn start_monitoring(&self, interval: Option<Duration>) -> Result<bool> {
        self.ctx.registry.start_monitoring(interval)
    }

    pub fn stop_monitoring(&self) -> Result<bool> {
        self.ctx.registry.stop_monitoring()
    }

    pub fn monitor_status(&self) -> Result<MonitorStatus> {
        let transitions = self.ctx.registry.transitions_since(0)?;
        Ok(MonitorStatus {
            active: self.ctx.registry.monitoring_active(),
            known_mounts: self.ctx.registry.mounts()?.len() as u64,
            last_transition_seq: transitions.last().map(|event| event.seq).unwrap_or(0),
        })
    }

    pub fn poll_transitions(&self, from_seq: u64) -> Result<Vec<StatusTransition>> {
        self.ctx.registry.transitions_since(from_seq)
    }

    pub fn mount_report(&self) -> Result<MountReport> {
        self.ctx.registry.report()
    }

    pub fn render_summary(&self, report: &HealthReport) -> Result<String> {
        Ok(render_markdown_summary(report, &self.mount_report()?))
    }
}

pub fn write_report_json(report: &HealthReport, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize health report")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    Ok(())
}

pub fn load_report(path: impl AsRef<Path>) -> Result<HealthReport> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    let report: HealthReport = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use mount_medic_core::{
        DiagnosticsContext, HealthCategory, HealthStatus, MountRegistry, MountStatus,
        MountTableSource, PathProbe, ProbeOutcome, RawMountEntry, Settings,
    };

    use super::{load_report, write_report_json, HealthRunRequest, HealthService};

    struct FixedTable {
        entries: Vec<RawMountEntry>,
    }

    impl MountTableSource for FixedTable {
        fn entries(&self) -> Vec<RawMountEntry> {
            self.entries.clone()
        }
    }

    struct SequenceProbe {
        outcomes: Mutex<HashMap<String, Vec<ProbeOutcome>>>,
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

    fn scripted_service(
        entries: Vec<RawMountEntry>,
        outcomes: HashMap<String, Vec<ProbeOutcome>>,
    ) -> HealthService {
        let settings = Settings {
            join_timeout_secs: 2,
            ..Settings::default()
        };
        let registry = MountRegistry::with_sources(
            settings.clone(),
            Arc::new(FixedTable { entries }),
            Arc::new(SequenceProbe {
                outcomes: Mutex::new(outcomes),
            }),
        );
        HealthService::with_context(Arc::new(DiagnosticsContext::with_registry(
            settings, registry,
        )))
        .expect("service")
    }

    fn nfs_entry(path: &str) -> RawMountEntry {
        RawMountEntry {
            device: "server:/vol".to_string(),
            path: path.to_string(),
            filesystem: "nfs4".to_string(),
            options: vec!["rw".to_string()],
        }
    }

    #[test]
    fn monitoring_lifecycle_reaches_status_and_transitions() {
        let outcomes = HashMap::from([(
            "/mnt/media".to_string(),
            vec![
                ProbeOutcome::healthy(4),
                ProbeOutcome::unavailable("Network mount disconnected"),
            ],
        )]);
        let service = scripted_service(vec![nfs_entry("/mnt/media")], outcomes);

        let mounts = service.discover_mounts().expect("discover");
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].status, MountStatus::Healthy);

        assert!(service
            .start_monitoring(Some(Duration::from_millis(10)))
            .expect("start"));
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let transitions = service.poll_transitions(0).expect("poll");
            if !transitions.is_empty() {
                assert_eq!(transitions[0].current, MountStatus::Unavailable);
                break;
            }
            assert!(Instant::now() < deadline, "no transition observed");
            std::thread::sleep(Duration::from_millis(25));
        }
        let status = service.monitor_status().expect("status");
        assert!(status.active);
        assert_eq!(status.known_mounts, 1);
        assert!(status.last_transition_seq >= 1);

        assert!(service.stop_monitoring().expect("stop"));
        assert!(!service.monitor_status().expect("status").active);

        let report = service.mount_report().expect("report");
        assert_eq!(report.total_mounts, 1);
        assert_eq!(report.unavailable_mounts, 1);
        assert_eq!(report.network_mounts, 1);
    }

    #[test]
    fn check_path_synthesizes_placeholder_for_unknown_paths() {
        let outcomes = HashMap::from([(
            "/mnt/media".to_string(),
            vec![ProbeOutcome::healthy(4)],
        )]);
        let service = scripted_service(vec![nfs_entry("/mnt/media")], outcomes);

        let mount = service.check_path("/mnt/ghost").expect("check");
        assert_eq!(mount.status, MountStatus::Unavailable);
        assert_eq!(mount.error.as_deref(), Some("Mount point not found"));
    }

    #[test]
    fn health_request_scopes_categories() {
        let root = tempfile::tempdir().expect("tempdir");
        let settings = Settings {
            config_dir: root.path().join("config"),
            cache_dir: root.path().join("cache"),
            log_dir: root.path().join("logs"),
            backup_dir: root.path().join("backups"),
            temp_dir: root.path().join("tmp"),
            ..Settings::default()
        };
        let service = HealthService::new(settings).expect("service");

        let request = HealthRunRequest {
            categories: vec![HealthCategory::Configuration],
            parallel: Some(false),
        };
        let report = service.run_health(&request);
        assert_eq!(report.total_checks(), 3);
        assert_eq!(report.overall_status(), HealthStatus::Healthy);
        assert!(report
            .results
            .iter()
            .all(|result| result.category == HealthCategory::Configuration));
    }

    #[test]
    fn reports_round_trip_through_json_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let settings = Settings {
            config_dir: root.path().join("config"),
            cache_dir: root.path().join("cache"),
            log_dir: root.path().join("logs"),
            backup_dir: root.path().join("backups"),
            temp_dir: root.path().join("tmp"),
            ..Settings::default()
        };
        let service = HealthService::new(settings).expect("service");
        let report = service.run_health(&HealthRunRequest {
            categories: vec![HealthCategory::Configuration],
            parallel: Some(false),
        });

        let path = root.path().join("health.json");
        write_report_json(&report, &path).expect("write");
        let loaded = load_report(&path).expect("load");
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.total_checks(), report.total_checks());
        assert_eq!(loaded.overall_status(), report.overall_status());

        assert!(load_report(root.path().join("missing.json")).is_err());
    }
}
