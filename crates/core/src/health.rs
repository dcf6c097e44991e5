use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::DiagnosticsContext;
use crate::model::{HealthCategory, HealthReport, HealthResult, HealthStatus};
use crate::pool::{panic_message, run_jobs, JobOutcome};
use crate::probe::ProbeError;

/// One diagnostic probe. Implementations must stay panic-free in spirit;
/// the orchestrator still converts a panic into a critical result rather
/// than letting it take down a run.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &'static str;
    fn category(&self) -> HealthCategory;
    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult>;
}

pub struct HealthChecker {
    ctx: Arc<DiagnosticsContext>,
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new(ctx: Arc<DiagnosticsContext>) -> Self {
        Self {
            ctx,
            checks: Vec::new(),
        }
    }

    pub fn with_builtin_checks(ctx: Arc<DiagnosticsContext>) -> Result<Self> {
        let mut checker = Self::new(ctx);
        for check in crate::checks::builtin_checks() {
            checker.register(check)?;
        }
        Ok(checker)
    }

    /// Registration is the only place a caller can misconfigure the
    /// orchestrator, so it is the only operation that returns an error.
    pub fn register(&mut self, check: Arc<dyn HealthCheck>) -> Result<()> {
        if self
            .checks
            .iter()
            .any(|existing| existing.name() == check.name())
        {
            bail!("health check {:?} is already registered", check.name());
        }
        debug!(
            "registered health check {} ({})",
            check.name(),
            check.category()
        );
        self.checks.push(check);
        Ok(())
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Runs the selected checks and always produces a report: failures,
    /// panics and timeouts become critical results, never errors.
    pub fn run(
        &self,
        categories: Option<&[HealthCategory]>,
        parallel: Option<bool>,
    ) -> HealthReport {
        let started = Instant::now();
        let mut report = HealthReport::new(
            Uuid::new_v4().to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let selected = self.select(categories);
        if selected.is_empty() {
            report.total_duration_ms = started.elapsed().as_millis() as u64;
            return report;
        }

        let parallel = parallel.unwrap_or(self.ctx.settings.parallel_health_checks);
        info!(
            "running {} health check(s) ({})",
            selected.len(),
            if parallel { "parallel" } else { "sequential" }
        );

        if parallel && selected.len() > 1 {
            let jobs = selected
                .iter()
                .map(|check| {
                    let name = check.name().to_string();
                    let check = Arc::clone(check);
                    let ctx = Arc::clone(&self.ctx);
                    let run: Box<dyn FnOnce() -> HealthResult + Send> =
                        Box::new(move || execute_check(check.as_ref(), &ctx));
                    (name, run)
                })
                .collect();
            let workers = self.ctx.settings.max_workers.min(selected.len());
            let timeout = self.ctx.settings.health_check_timeout();
            for (name, outcome) in run_jobs(jobs, workers, timeout) {
                let result = match outcome {
                    JobOutcome::Completed(result) => result,
                    JobOutcome::Panicked(message) => {
                        converted_failure(&name, ProbeError::Failure(message).to_string())
                    }
                    JobOutcome::TimedOut => converted_failure(
                        &name,
                        ProbeError::Timeout(self.ctx.settings.health_check_timeout_secs)
                            .to_string(),
                    ),
                };
                report.record(result);
            }
        } else {
            // Panics must land as results on this path too.
            for check in &selected {
                let result = match catch_unwind(AssertUnwindSafe(|| {
                    execute_check(check.as_ref(), &self.ctx)
                })) {
                    Ok(result) => result,
                    Err(payload) => converted_failure(
                        check.name(),
                        ProbeError::Failure(panic_message(payload)).to_string(),
                    ),
                };
                report.record(result);
            }
        }

        report.total_duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "health run {} finished: {} ({} checks in {}ms)",
            report.run_id,
            report.overall_status(),
            report.total_checks(),
            report.total_duration_ms
        );
        report
    }

    /// Canonical category order first, registration order within a category.
    fn select(&self, categories: Option<&[HealthCategory]>) -> Vec<Arc<dyn HealthCheck>> {
        let mut selected = Vec::new();
        for category in HealthCategory::ALL {
            if categories.map_or(true, |wanted| wanted.contains(&category)) {
                for check in &self.checks {
                    if check.category() == category {
                        selected.push(Arc::clone(check));
                    }
                }
            }
        }
        selected
    }
}

fn execute_check(check: &dyn HealthCheck, ctx: &DiagnosticsContext) -> HealthResult {
    let started = Instant::now();
    let mut result = match check.run(ctx) {
        Ok(result) => result,
        Err(err) => converted_failure(check.name(), ProbeError::Failure(format!("{err:#}")).to_string()),
    };
    result.duration_ms = Some(started.elapsed().as_millis() as u64);
    result
}

fn converted_failure(name: &str, message: String) -> HealthResult {
    HealthResult {
        name: name.to_string(),
        category: HealthCategory::Unknown,
        status: HealthStatus::Critical,
        message,
        details: None,
        fix_suggestion: None,
        duration_ms: None,
        severity: severity_for(HealthStatus::Critical),
    }
}

pub(crate) fn severity_for(status: HealthStatus) -> u8 {
    match status {
        HealthStatus::Healthy => 1,
        HealthStatus::Warning | HealthStatus::Unknown => 2,
        HealthStatus::Critical => 3,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};

    use super::{HealthCheck, HealthChecker};
    use crate::context::DiagnosticsContext;
    use crate::model::{HealthCategory, HealthResult, HealthStatus};
    use crate::settings::Settings;

    struct StaticCheck {
        name: &'static str,
        category: HealthCategory,
        status: HealthStatus,
    }

    impl HealthCheck for StaticCheck {
        fn name(&self) -> &'static str {
            self.name
        }

        fn category(&self) -> HealthCategory {
            self.category
        }

        fn run(&self, _ctx: &DiagnosticsContext) -> Result<HealthResult> {
            Ok(HealthResult {
                name: self.name.to_string(),
                category: self.category,
                status: self.status,
                message: format!("{} ran", self.name),
                details: None,
                fix_suggestion: None,
                duration_ms: None,
                severity: super::severity_for(self.status),
            })
        }
    }

    struct FailingCheck;

    impl HealthCheck for FailingCheck {
        fn name(&self) -> &'static str {
            "exploding_disk"
        }

        fn category(&self) -> HealthCategory {
            HealthCategory::Filesystem
        }

        fn run(&self, _ctx: &DiagnosticsContext) -> Result<HealthResult> {
            Err(anyhow!("disk fell over"))
        }
    }

    struct PanickyCheck;

    impl HealthCheck for PanickyCheck {
        fn name(&self) -> &'static str {
            "panicky_probe"
        }

        fn category(&self) -> HealthCategory {
            HealthCategory::Performance
        }

        fn run(&self, _ctx: &DiagnosticsContext) -> Result<HealthResult> {
            panic!("probe lost its mind");
        }
    }

    fn test_checker() -> HealthChecker {
        HealthChecker::new(Arc::new(DiagnosticsContext::new(Settings::default())))
    }

    fn static_check(
        name: &'static str,
        category: HealthCategory,
        status: HealthStatus,
    ) -> Arc<dyn HealthCheck> {
        Arc::new(StaticCheck {
            name,
            category,
            status,
        })
    }

    #[test]
    fn duplicate_names_are_rejected_at_registration() {
        let mut checker = test_checker();
        checker
            .register(static_check(
                "dns_resolution",
                HealthCategory::Connectivity,
                HealthStatus::Healthy,
            ))
            .expect("first registration");
        let duplicate = checker.register(static_check(
            "dns_resolution",
            HealthCategory::Filesystem,
            HealthStatus::Healthy,
        ));
        assert!(duplicate.is_err());
        assert_eq!(checker.check_names(), vec!["dns_resolution"]);
    }

    #[test]
    fn category_filter_selects_only_requested_checks() {
        let mut checker = test_checker();
        checker
            .register(static_check(
                "net_a",
                HealthCategory::Connectivity,
                HealthStatus::Healthy,
            ))
            .expect("register");
        checker
            .register(static_check(
                "fs_a",
                HealthCategory::Filesystem,
                HealthStatus::Warning,
            ))
            .expect("register");

        let report = checker.run(Some(&[HealthCategory::Filesystem]), Some(false));
        assert_eq!(report.total_checks(), 1);
        assert_eq!(report.results[0].name, "fs_a");
        assert_eq!(report.warning_count, 1);
        assert_eq!(report.overall_status(), HealthStatus::Warning);
    }

    #[test]
    fn sequential_order_is_category_then_registration() {
        let mut checker = test_checker();
        checker
            .register(static_check(
                "perf_first",
                HealthCategory::Performance,
                HealthStatus::Healthy,
            ))
            .expect("register");
        checker
            .register(static_check(
                "net_second",
                HealthCategory::Connectivity,
                HealthStatus::Healthy,
            ))
            .expect("register");
        checker
            .register(static_check(
                "net_third",
                HealthCategory::Connectivity,
                HealthStatus::Healthy,
            ))
            .expect("register");

        let report = checker.run(None, Some(false));
        let names: Vec<&str> = report.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["net_second", "net_third", "perf_first"]);
    }

    #[test]
    fn parallel_and_sequential_produce_the_same_result_set() {
        let build = || {
            let mut checker = test_checker();
            checker
                .register(static_check(
                    "net_a",
                    HealthCategory::Connectivity,
                    HealthStatus::Healthy,
                ))
                .expect("register");
            checker
                .register(static_check(
                    "cfg_a",
                    HealthCategory::Configuration,
                    HealthStatus::Warning,
                ))
                .expect("register");
            checker
                .register(static_check(
                    "dep_a",
                    HealthCategory::Dependencies,
                    HealthStatus::Critical,
                ))
                .expect("register");
            checker
        };

        let sequential = build().run(None, Some(false));
        let parallel = build().run(None, Some(true));

        let summarize = |report: &crate::model::HealthReport| {
            let mut pairs: Vec<(String, HealthStatus)> = report
                .results
                .iter()
                .map(|result| (result.name.clone(), result.status))
                .collect();
            pairs.sort();
            pairs
        };
        assert_eq!(summarize(&sequential), summarize(&parallel));
        assert_eq!(sequential.critical_count, parallel.critical_count);
        assert_eq!(parallel.overall_status(), HealthStatus::Critical);
    }

    #[test]
    fn failing_check_converts_to_critical_unknown_result() {
        let mut checker = test_checker();
        checker.register(Arc::new(FailingCheck)).expect("register");

        let report = checker.run(None, Some(false));
        assert_eq!(report.total_checks(), 1);
        let result = &report.results[0];
        assert_eq!(result.name, "exploding_disk");
        assert_eq!(result.category, HealthCategory::Unknown);
        assert_eq!(result.status, HealthStatus::Critical);
        assert!(result.message.contains("Health check failed"));
        assert!(result.message.contains("disk fell over"));
        assert!(result.duration_ms.is_some());
    }

    #[test]
    fn panicking_check_is_contained_in_parallel_mode() {
        let mut checker = test_checker();
        checker.register(Arc::new(PanickyCheck)).expect("register");
        checker
            .register(static_check(
                "net_a",
                HealthCategory::Connectivity,
                HealthStatus::Healthy,
            ))
            .expect("register");

        let report = checker.run(None, Some(true));
        assert_eq!(report.total_checks(), 2);
        let panicked = report
            .results
            .iter()
            .find(|result| result.name == "panicky_probe")
            .expect("panicked result present");
        assert_eq!(panicked.status, HealthStatus::Critical);
        assert!(panicked.message.contains("probe lost its mind"));
        assert_eq!(report.healthy_count, 1);
        assert_eq!(report.critical_count, 1);
    }

    #[test]
    fn panicking_check_is_contained_in_sequential_mode() {
        let mut checker = test_checker();
        checker.register(Arc::new(PanickyCheck)).expect("register");
        checker
            .register(static_check(
                "net_a",
                HealthCategory::Connectivity,
                HealthStatus::Healthy,
            ))
            .expect("register");

        let report = checker.run(None, Some(false));
        assert_eq!(report.total_checks(), 2);
        let panicked = report
            .results
            .iter()
            .find(|result| result.name == "panicky_probe")
            .expect("panicked result present");
        assert_eq!(panicked.status, HealthStatus::Critical);
        assert_eq!(panicked.category, HealthCategory::Unknown);
        assert!(panicked.message.contains("Health check failed"));
        assert!(panicked.message.contains("probe lost its mind"));
        assert_eq!(report.healthy_count, 1);
        assert_eq!(report.critical_count, 1);
    }

    #[test]
    fn lone_check_requested_parallel_is_still_contained() {
        let mut checker = test_checker();
        checker.register(Arc::new(PanickyCheck)).expect("register");

        let report = checker.run(None, Some(true));
        assert_eq!(report.total_checks(), 1);
        assert_eq!(report.results[0].status, HealthStatus::Critical);
        assert!(report.results[0].message.contains("probe lost its mind"));
        assert_eq!(report.critical_count, 1);
        assert_eq!(report.overall_status(), HealthStatus::Critical);
    }

    #[test]
    fn empty_selection_yields_an_empty_report() {
        let checker = test_checker();
        let report = checker.run(None, None);
        assert_eq!(report.total_checks(), 0);
        assert_eq!(report.overall_status(), HealthStatus::Unknown);
        assert_eq!(report.health_percentage(), 0.0);
        assert!(!report.run_id.is_empty());
    }
}
