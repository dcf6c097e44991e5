use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mount_medic_core::{HealthCategory, HealthStatus, MountPoint, MountStatus, Settings};
use mount_medic_service::{write_report_json, HealthRunRequest, HealthService};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "mount-medic",
    version,
    about = "Discover and monitor filesystem mounts and diagnose their health."
)]
struct Cli {
    /// Settings file (JSON). Built-in defaults apply when omitted.
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Discover mounts and print the classified inventory.
    Mounts(MountsArgs),
    /// Probe one path and report the backing mount's health.
    Check(CheckArgs),
    /// Run the health check suite and emit a report.
    Health(HealthArgs),
    /// Monitor mounts in the background and print status transitions.
    Watch(WatchArgs),
    /// Print the aggregate mount report.
    Report(ReportArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliCategory {
    Connectivity,
    Filesystem,
    Configuration,
    Dependencies,
    Performance,
}

impl From<CliCategory> for HealthCategory {
    fn from(value: CliCategory) -> Self {
        match value {
            CliCategory::Connectivity => HealthCategory::Connectivity,
            CliCategory::Filesystem => HealthCategory::Filesystem,
            CliCategory::Configuration => HealthCategory::Configuration,
            CliCategory::Dependencies => HealthCategory::Dependencies,
            CliCategory::Performance => HealthCategory::Performance,
        }
    }
}

#[derive(Debug, Args)]
struct MountsArgs {
    /// Optional JSON output file for the mount report.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Path to probe.
    path: String,

    /// Attempt a remount when the path is unavailable.
    #[arg(long)]
    remount: bool,
}

#[derive(Debug, Args)]
struct HealthArgs {
    /// Restrict the run to one or more categories (repeatable).
    #[arg(long = "category", value_name = "CATEGORY", num_args = 1.., action = ArgAction::Append)]
    categories: Vec<CliCategory>,

    /// Run checks one at a time instead of on the worker pool.
    #[arg(long)]
    sequential: bool,

    /// Optional JSON output file for the health report.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Optional markdown summary output file.
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct WatchArgs {
    /// Poll interval in seconds. Defaults to the settings value.
    #[arg(long, value_name = "SECS")]
    interval_secs: Option<u64>,

    /// Stop after this many seconds. Watches until Ctrl-C when omitted.
    #[arg(long, value_name = "SECS")]
    duration_secs: Option<u64>,
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Optional JSON output file for the mount report.
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let service = HealthService::new(settings)?;

    let code = match cli.command {
        Commands::Mounts(args) => run_mounts_command(&service, args)?,
        Commands::Check(args) => run_check_command(&service, args)?,
        Commands::Health(args) => run_health_command(&service, args)?,
        Commands::Watch(args) => run_watch_command(&service, args)?,
        Commands::Report(args) => run_report_command(&service, args)?,
    };
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run_mounts_command(service: &HealthService, args: MountsArgs) -> Result<i32> {
    let mounts = service.discover_mounts()?;

    if mounts.is_empty() {
        println!("No mounts discovered.");
    } else {
        println!("Discovered {} mount(s):", mounts.len());
        for mount in &mounts {
            print_mount_line(mount);
        }
    }

    if let Some(path) = args.json {
        let report = service.mount_report()?;
        let payload =
            serde_json::to_string_pretty(&report).context("failed to serialize mount report")?;
        fs::write(&path, payload)
            .with_context(|| format!("failed to write mount report to {}", path.display()))?;
        println!("Mount report written to {}", path.display());
    }

    Ok(0)
}

fn run_check_command(service: &HealthService, args: CheckArgs) -> Result<i32> {
    let mut mount = service.check_path(&args.path)?;

    if mount.status == MountStatus::Unavailable && args.remount {
        println!("{} is unavailable; attempting a remount.", mount.path);
        if service.remount(&args.path)? {
            mount = service.check_path(&args.path)?;
        } else {
            println!("Remount did not restore {}.", mount.path);
        }
    }

    println!(
        "{}: {} [{} via {}]",
        mount.path, mount.status, mount.filesystem, mount.transport
    );
    println!("  device: {}", mount.device);
    match mount.latency_ms {
        Some(ms) => println!("  latency: {ms}ms"),
        None => println!("  latency: n/a"),
    }
    if let Some(checked) = &mount.last_checked {
        println!("  last checked: {checked}");
    }
    if let Some(error) = &mount.error {
        println!("  error: {error}");
    }

    Ok(if mount.status == MountStatus::Unavailable {
        2
    } else {
        0
    })
}

fn run_health_command(service: &HealthService, args: HealthArgs) -> Result<i32> {
    // Populate the registry first so mount-backed checks see real entries.
    service.discover_mounts()?;

    let request = HealthRunRequest {
        categories: args
            .categories
            .iter()
            .copied()
            .map(HealthCategory::from)
            .collect(),
        parallel: args.sequential.then_some(false),
    };
    let report = service.run_health(&request);

    println!(
        "Health run {} finished in {} ms: {} ({:.0}% healthy)",
        report.run_id,
        report.total_duration_ms,
        report.overall_status(),
        report.health_percentage()
    );
    println!(
        "{} check(s): {} healthy, {} warning, {} critical, {} unknown.",
        report.total_checks(),
        report.healthy_count,
        report.warning_count,
        report.critical_count,
        report.unknown_count
    );
    for result in &report.results {
        let duration = result
            .duration_ms
            .map(|ms| format!(" ({ms} ms)"))
            .unwrap_or_default();
        println!(
            "- [{}] {} ({}): {}{duration}",
            status_tag(result.status),
            result.name,
            result.category,
            result.message
        );
        if let Some(fix) = &result.fix_suggestion {
            println!("  fix: {fix}");
        }
        if let Some(details) = &result.details {
            println!("  details: {details}");
        }
    }

    if let Some(output) = &args.output {
        write_report_json(&report, output)?;
        println!("Health report written to {}", output.display());
    }
    if let Some(md_path) = &args.md {
        let summary = service.render_summary(&report)?;
        fs::write(md_path, summary).with_context(|| {
            format!("failed to write markdown summary to {}", md_path.display())
        })?;
        println!("Markdown summary written to {}", md_path.display());
    }

    Ok(if report.overall_status() == HealthStatus::Critical {
        2
    } else {
        0
    })
}

fn run_watch_command(service: &HealthService, args: WatchArgs) -> Result<i32> {
    let mounts = service.discover_mounts()?;
    println!("Watching {} mount(s).", mounts.len());

    let interval = args.interval_secs.map(Duration::from_secs);
    service.start_monitoring(interval)?;

    let deadline = args
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut cursor = 0_u64;
    loop {
        std::thread::sleep(Duration::from_millis(500));
        for event in service.poll_transitions(cursor)? {
            println!(
                "[{}] {}: {} -> {}",
                event.at, event.path, event.previous, event.current
            );
            cursor = event.seq;
        }
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
    }

    service.stop_monitoring()?;
    let report = service.mount_report()?;
    println!(
        "Watch finished: {} healthy, {} degraded, {} unavailable.",
        report.healthy_mounts, report.degraded_mounts, report.unavailable_mounts
    );
    Ok(0)
}

fn run_report_command(service: &HealthService, args: ReportArgs) -> Result<i32> {
    service.discover_mounts()?;
    let report = service.mount_report()?;

    println!(
        "Mounts: {} total | {} healthy, {} degraded, {} unavailable, {} unknown",
        report.total_mounts,
        report.healthy_mounts,
        report.degraded_mounts,
        report.unavailable_mounts,
        report.unknown_mounts
    );
    println!(
        "Transport: {} network, {} local.",
        report.network_mounts, report.local_mounts
    );
    for mount in &report.mounts {
        print_mount_line(mount);
    }

    if let Some(path) = args.json {
        let payload =
            serde_json::to_string_pretty(&report).context("failed to serialize mount report")?;
        fs::write(&path, payload)
            .with_context(|| format!("failed to write mount report to {}", path.display()))?;
        println!("Mount report written to {}", path.display());
    }

    Ok(0)
}

fn print_mount_line(mount: &MountPoint) {
    let latency = mount
        .latency_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "n/a".to_string());
    println!(
        "- {} [{} via {}] {} (latency {})",
        mount.path, mount.filesystem, mount.transport, mount.status, latency
    );
    if let Some(error) = &mount.error {
        println!("  error: {error}");
    }
}

fn status_tag(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Healthy => "PASS",
        HealthStatus::Warning => "WARN",
        HealthStatus::Critical => "FAIL",
        HealthStatus::Unknown => "SKIP",
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
