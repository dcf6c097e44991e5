use crate::model::{HealthCategory, HealthReport, HealthResult, MountReport};

pub fn render_markdown_summary(report: &HealthReport, mounts: &MountReport) -> String {
    let mut out = String::new();
    out.push_str("# Mount Medic Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Run: `{}`\n- Generated at: `{}`\n- Overall status: `{}`\n- Checks: {} total ({} healthy, {} warning, {} critical, {} unknown, {:.0}% healthy)\n- Elapsed: `{} ms`\n\n",
        report.report_version,
        report.run_id,
        report.generated_at,
        report.overall_status(),
        report.total_checks(),
        report.healthy_count,
        report.warning_count,
        report.critical_count,
        report.unknown_count,
        report.health_percentage(),
        report.total_duration_ms
    ));

    out.push_str("## Mount Inventory\n\n");
    if mounts.mounts.is_empty() {
        out.push_str("No mounts discovered.\n\n");
    } else {
        out.push_str(&format!(
            "{} mount(s): {} healthy, {} degraded, {} unavailable, {} network, {} local\n\n",
            mounts.total_mounts,
            mounts.healthy_mounts,
            mounts.degraded_mounts,
            mounts.unavailable_mounts,
            mounts.network_mounts,
            mounts.local_mounts
        ));
        for mount in &mounts.mounts {
            let latency = mount
                .latency_ms
                .map(|ms| format!("{ms}ms"))
                .unwrap_or_else(|| "n/a".to_string());
            out.push_str(&format!(
                "- `{}` (`{}`, `{}`): {}, latency {}\n",
                mount.path, mount.device, mount.transport, mount.status, latency
            ));
            if let Some(error) = &mount.error {
                out.push_str(&format!("  - error: {}\n", error));
            }
        }
        out.push('\n');
    }

    out.push_str("## Health Checks\n\n");
    if report.results.is_empty() {
        out.push_str("No checks were run.\n");
        return out;
    }
    let mut categories: Vec<HealthCategory> = HealthCategory::ALL.to_vec();
    categories.push(HealthCategory::Unknown);
    for category in categories {
        let results: Vec<&HealthResult> = report
            .results
            .iter()
            .filter(|result| result.category == category)
            .collect();
        if results.is_empty() {
            continue;
        }
        out.push_str(&format!("### {}\n\n", category));
        for result in results {
            let duration = result
                .duration_ms
                .map(|ms| format!(" ({ms} ms)"))
                .unwrap_or_default();
            out.push_str(&format!(
                "- `{}`: `{}` {}{}\n",
                result.name, result.status, result.message, duration
            ));
            if let Some(fix) = &result.fix_suggestion {
                out.push_str(&format!("  - fix: {}\n", fix));
            }
            if let Some(details) = &result.details {
                out.push_str(&format!("  - details: {}\n", details));
            }
        }
        out.push('\n');
    }
    out
}
