use std::env;
use std::fs;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use sysinfo::{Disks, System};

use crate::context::DiagnosticsContext;
use crate::health::{severity_for, HealthCheck};
use crate::model::{HealthCategory, HealthResult, HealthStatus, MountStatus};

/// The default probe set, in canonical category order.
pub fn builtin_checks() -> Vec<Arc<dyn HealthCheck>> {
    vec![
        Arc::new(NetworkReachability),
        Arc::new(DnsResolution),
        Arc::new(NetworkMountHealth),
        Arc::new(SourcePathLiveness),
        Arc::new(DiskSpace),
        Arc::new(WorkspacePermissions),
        Arc::new(SettingsValidity),
        Arc::new(RequiredDirectories),
        Arc::new(CredentialRoundtrip),
        Arc::new(RequiredBinaries),
        Arc::new(SystemCapabilities),
        Arc::new(SystemResources),
        Arc::new(IoThroughput),
        Arc::new(NetworkLatency),
    ]
}

fn check_result(
    name: &str,
    category: HealthCategory,
    status: HealthStatus,
    message: impl Into<String>,
) -> HealthResult {
    HealthResult {
        name: name.to_string(),
        category,
        status,
        message: message.into(),
        details: None,
        fix_suggestion: None,
        duration_ms: None,
        severity: severity_for(status),
    }
}

fn with_fix(mut result: HealthResult, fix: impl Into<String>) -> HealthResult {
    result.fix_suggestion = Some(fix.into());
    result
}

struct NetworkReachability;

impl HealthCheck for NetworkReachability {
    fn name(&self) -> &'static str {
        "network_reachability"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Connectivity
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let address = &ctx.settings.probe_address;
        let resolved = address.to_socket_addrs().ok().and_then(|mut addrs| addrs.next());
        let Some(addr) = resolved else {
            return Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Probe address {address} did not resolve"),
                ),
                "Check the probe_address setting",
            ));
        };
        match TcpStream::connect_timeout(&addr, ctx.settings.connect_timeout()) {
            Ok(_) => Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                format!("Network reachable via {address}"),
            )),
            Err(err) => Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Cannot reach {address}: {err}"),
                ),
                "Check the network connection and firewall rules",
            )),
        }
    }
}

struct DnsResolution;

impl HealthCheck for DnsResolution {
    fn name(&self) -> &'static str {
        "dns_resolution"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Connectivity
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let host = &ctx.settings.probe_host;
        match (host.as_str(), 443u16).to_socket_addrs() {
            Ok(mut addrs) => {
                if addrs.next().is_some() {
                    Ok(check_result(
                        self.name(),
                        self.category(),
                        HealthStatus::Healthy,
                        format!("DNS resolved {host}"),
                    ))
                } else {
                    Ok(with_fix(
                        check_result(
                            self.name(),
                            self.category(),
                            HealthStatus::Critical,
                            format!("DNS returned no addresses for {host}"),
                        ),
                        "Check the DNS server configuration",
                    ))
                }
            }
            Err(err) => Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("DNS resolution failed for {host}: {err}"),
                ),
                "Check the DNS server configuration",
            )),
        }
    }
}

struct NetworkMountHealth;

impl HealthCheck for NetworkMountHealth {
    fn name(&self) -> &'static str {
        "network_mount_health"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Connectivity
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let mounts = ctx.registry.mounts()?;
        let mounts = if mounts.is_empty() {
            ctx.registry.discover()?
        } else {
            mounts
        };
        let network: Vec<_> = mounts.iter().filter(|mount| mount.is_network()).collect();
        if network.is_empty() {
            return Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "No network mounts detected",
            ));
        }
        let unhealthy: Vec<&str> = network
            .iter()
            .filter(|mount| !mount.is_healthy())
            .map(|mount| mount.path.as_str())
            .collect();
        if unhealthy.is_empty() {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                format!("All {} network mount(s) healthy", network.len()),
            ))
        } else {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    format!("Unhealthy network mounts: {}", unhealthy.join(", ")),
                ),
                "Check network connectivity or remount the affected shares",
            ))
        }
    }
}

struct SourcePathLiveness;

impl HealthCheck for SourcePathLiveness {
    fn name(&self) -> &'static str {
        "source_path_liveness"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Filesystem
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        if ctx.settings.source_paths.is_empty() {
            return Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "No source paths configured",
            ));
        }

        let mut missing = Vec::new();
        let mut degraded = Vec::new();
        let mut unavailable = Vec::new();
        for path in &ctx.settings.source_paths {
            let display = path.display().to_string();
            if !path.exists() {
                missing.push(display);
                continue;
            }
            match ctx.registry.find_mount_for_path(&display)? {
                Some(mount_path) => match ctx.registry.check(&mount_path)?.status {
                    MountStatus::Healthy => {}
                    MountStatus::Degraded => degraded.push(format!("{display} (via {mount_path})")),
                    MountStatus::Unavailable | MountStatus::Unknown => {
                        unavailable.push(format!("{display} (via {mount_path})"))
                    }
                },
                None => degraded.push(format!("{display} (no backing mount)")),
            }
        }

        if !missing.is_empty() || !unavailable.is_empty() {
            let mut broken = missing;
            broken.extend(unavailable);
            return Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Unavailable source paths: {}", broken.join(", ")),
                ),
                "Verify the paths exist and their mounts are attached",
            ));
        }
        if !degraded.is_empty() {
            return Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    format!("Degraded source paths: {}", degraded.join(", ")),
                ),
                "Check the mounts backing the listed paths",
            ));
        }
        Ok(check_result(
            self.name(),
            self.category(),
            HealthStatus::Healthy,
            format!("All {} source path(s) healthy", ctx.settings.source_paths.len()),
        ))
    }
}

struct DiskSpace;

impl HealthCheck for DiskSpace {
    fn name(&self) -> &'static str {
        "disk_space"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Filesystem
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let disks = Disks::new_with_refreshed_list();
        let candidates: Vec<(&Path, u64)> = disks
            .list()
            .iter()
            .map(|disk| (disk.mount_point(), disk.available_space()))
            .collect();
        if candidates.is_empty() {
            return Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Warning,
                "No disks reported by the system",
            ));
        }

        let mut low = Vec::new();
        for (label, dir) in ctx.settings.workspace_dirs() {
            let Some(available) = best_disk_match(&candidates, dir) else {
                continue;
            };
            if available < ctx.settings.low_space_bytes {
                low.push(format!(
                    "{label} ({}) has {} free",
                    dir.display(),
                    human_bytes(available)
                ));
            }
        }

        if low.is_empty() {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                format!(
                    "All workspace volumes have at least {} free",
                    human_bytes(ctx.settings.low_space_bytes)
                ),
            ))
        } else {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    format!("Low disk space: {}", low.join(", ")),
                ),
                "Free up space on the listed volumes",
            ))
        }
    }
}

/// Longest mount-point prefix wins, so nested mounts resolve to the volume
/// that actually backs the directory.
fn best_disk_match(candidates: &[(&Path, u64)], path: &Path) -> Option<u64> {
    let mut best: Option<(usize, u64)> = None;
    for (mount, available) in candidates {
        if path.starts_with(mount) {
            let len = mount.as_os_str().len();
            if best.map_or(true, |(best_len, _)| len > best_len) {
                best = Some((len, *available));
            }
        }
    }
    best.map(|(_, available)| available)
}

struct WorkspacePermissions;

impl HealthCheck for WorkspacePermissions {
    fn name(&self) -> &'static str {
        "workspace_permissions"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Filesystem
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let mut failures = Vec::new();
        for (label, dir) in ctx.settings.workspace_dirs() {
            if !dir.exists() {
                continue;
            }
            let scratch = dir.join(".mount-medic-write-probe");
            match fs::write(&scratch, b"probe") {
                Ok(()) => {
                    let _ = fs::remove_file(&scratch);
                }
                Err(err) => failures.push(format!("{label} ({}): {err}", dir.display())),
            }
        }
        if failures.is_empty() {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "Workspace directories are writable",
            ))
        } else {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Unwritable workspace directories: {}", failures.join(", ")),
                ),
                "Fix ownership or permissions on the listed directories",
            ))
        }
    }
}

struct SettingsValidity;

impl HealthCheck for SettingsValidity {
    fn name(&self) -> &'static str {
        "settings_validity"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Configuration
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let violations = ctx.settings.violations();
        if violations.is_empty() {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "Settings are valid",
            ))
        } else {
            let mut result = with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Invalid settings: {}", violations.join("; ")),
                ),
                "Correct the listed settings values",
            );
            result.details = Some(violations.join("\n"));
            Ok(result)
        }
    }
}

struct RequiredDirectories;

impl HealthCheck for RequiredDirectories {
    fn name(&self) -> &'static str {
        "required_directories"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Configuration
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let mut failed = Vec::new();
        for (label, dir) in ctx.settings.workspace_dirs() {
            if dir.exists() {
                continue;
            }
            if let Err(err) = fs::create_dir_all(dir) {
                failed.push(format!("{label} ({}): {err}", dir.display()));
            }
        }
        if failed.is_empty() {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "All workspace directories exist",
            ))
        } else {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    format!("Could not create directories: {}", failed.join(", ")),
                ),
                "Create the listed directories manually",
            ))
        }
    }
}

struct CredentialRoundtrip;

impl HealthCheck for CredentialRoundtrip {
    fn name(&self) -> &'static str {
        "credential_roundtrip"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Configuration
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let Some(store) = &ctx.credentials else {
            return Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "Credential store not configured",
            ));
        };
        let key = "mount-medic-health-probe";
        let round_trip = store.set(key, "ok").and_then(|()| {
            let value = store.get(key)?;
            store.delete(key)?;
            Ok(value)
        });
        match round_trip {
            Ok(Some(value)) if value == "ok" => Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "Credential store round-trip succeeded",
            )),
            Ok(_) => Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    "Credential store returned a different value than was stored",
                ),
                "Check the credential backend",
            )),
            Err(err) => Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Credential store error: {err}"),
                ),
                "Check the credential backend",
            )),
        }
    }
}

const REQUIRED_BINARIES: [&str; 1] = ["mount"];
const OPTIONAL_BINARIES: [&str; 2] = ["ssh", "sshfs"];

fn binary_on_path(name: &str) -> bool {
    let Some(path) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path).any(|dir| dir.join(name).is_file())
}

struct RequiredBinaries;

impl HealthCheck for RequiredBinaries {
    fn name(&self) -> &'static str {
        "required_binaries"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Dependencies
    }

    fn run(&self, _ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let missing_required: Vec<&str> = REQUIRED_BINARIES
            .iter()
            .filter(|binary| !binary_on_path(binary))
            .copied()
            .collect();
        let missing_optional: Vec<&str> = OPTIONAL_BINARIES
            .iter()
            .filter(|binary| !binary_on_path(binary))
            .copied()
            .collect();

        if !missing_required.is_empty() {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Critical,
                    format!("Missing required binaries: {}", missing_required.join(", ")),
                ),
                "Install the listed tools with the system package manager",
            ))
        } else if !missing_optional.is_empty() {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    format!("Missing optional binaries: {}", missing_optional.join(", ")),
                ),
                "Install ssh and sshfs to enable SSHFS mount support",
            ))
        } else {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "All required binaries found",
            ))
        }
    }
}

struct SystemCapabilities;

impl HealthCheck for SystemCapabilities {
    fn name(&self) -> &'static str {
        "system_capabilities"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Dependencies
    }

    fn run(&self, _ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let mut problems = Vec::new();
        if env::var_os("HOME").is_none() {
            problems.push("HOME is not set".to_string());
        }
        let temp = env::temp_dir();
        let scratch = temp.join("mount-medic-capability-probe");
        match fs::write(&scratch, b"probe") {
            Ok(()) => {
                let _ = fs::remove_file(&scratch);
            }
            Err(err) => problems.push(format!("temp dir {} not writable: {err}", temp.display())),
        }

        if problems.is_empty() {
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                "HOME and the temp directory are usable",
            ))
        } else {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    problems.join("; "),
                ),
                "Fix the listed host environment issues",
            ))
        }
    }
}

struct SystemResources;

impl HealthCheck for SystemResources {
    fn name(&self) -> &'static str {
        "system_resources"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Performance
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let mut system = System::new();
        system.refresh_cpu_usage();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        system.refresh_cpu_usage();
        system.refresh_memory();

        let cpu = system.global_cpu_info().cpu_usage();
        let memory = if system.total_memory() == 0 {
            0.0
        } else {
            system.used_memory() as f32 / system.total_memory() as f32 * 100.0
        };
        let disks = Disks::new_with_refreshed_list();
        let root_disk = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"));
        let disk_usage = root_disk.map(|disk| {
            if disk.total_space() == 0 {
                0.0
            } else {
                (disk.total_space() - disk.available_space()) as f32 / disk.total_space() as f32
                    * 100.0
            }
        });

        let warn = ctx.settings.resource_warn_percent;
        let mut pressured = Vec::new();
        if cpu > warn {
            pressured.push(format!("CPU at {cpu:.0}%"));
        }
        if memory > warn {
            pressured.push(format!("memory at {memory:.0}%"));
        }
        if let Some(disk_usage) = disk_usage {
            if disk_usage > warn {
                pressured.push(format!("root disk at {disk_usage:.0}%"));
            }
        }

        if pressured.is_empty() {
            let disk_label = disk_usage
                .map(|usage| format!("{usage:.0}%"))
                .unwrap_or_else(|| "n/a".to_string());
            Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Healthy,
                format!("CPU {cpu:.0}%, memory {memory:.0}%, root disk {disk_label}"),
            ))
        } else {
            Ok(with_fix(
                check_result(
                    self.name(),
                    self.category(),
                    HealthStatus::Warning,
                    format!("High resource usage: {}", pressured.join(", ")),
                ),
                "Investigate the pressured resources",
            ))
        }
    }
}

struct IoThroughput;

impl HealthCheck for IoThroughput {
    fn name(&self) -> &'static str {
        "io_throughput"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Performance
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let dir = &ctx.settings.temp_dir;
        let scratch = dir.join(".mount-medic-io-probe");
        let payload = vec![0u8; ctx.settings.io_probe_bytes as usize];

        let timed = (|| -> std::io::Result<(f64, f64)> {
            fs::create_dir_all(dir)?;
            let started = Instant::now();
            let mut file = fs::File::create(&scratch)?;
            file.write_all(&payload)?;
            file.sync_all()?;
            let write_secs = started.elapsed().as_secs_f64();

            let started = Instant::now();
            let mut file = fs::File::open(&scratch)?;
            let mut buffer = Vec::with_capacity(payload.len());
            file.read_to_end(&mut buffer)?;
            let read_secs = started.elapsed().as_secs_f64();
            Ok((write_secs, read_secs))
        })();
        let _ = fs::remove_file(&scratch);

        let (write_secs, read_secs) = match timed {
            Ok(timings) => timings,
            Err(err) => {
                return Ok(with_fix(
                    check_result(
                        self.name(),
                        self.category(),
                        HealthStatus::Warning,
                        format!("I/O probe failed: {err}"),
                    ),
                    "Check the disk backing the temp directory",
                ));
            }
        };

        let megabytes = payload.len() as f64 / (1024.0 * 1024.0);
        let write_mbps = megabytes / write_secs.max(1e-6);
        let read_mbps = megabytes / read_secs.max(1e-6);
        let (status, label) = throughput_tier(write_mbps, read_mbps);
        let message = format!("{label}: write {write_mbps:.1} MB/s, read {read_mbps:.1} MB/s");
        if status == HealthStatus::Healthy {
            Ok(check_result(self.name(), self.category(), status, message))
        } else {
            Ok(with_fix(
                check_result(self.name(), self.category(), status, message),
                "Check the disk backing the temp directory",
            ))
        }
    }
}

fn throughput_tier(write_mbps: f64, read_mbps: f64) -> (HealthStatus, &'static str) {
    if write_mbps > 10.0 && read_mbps > 20.0 {
        (HealthStatus::Healthy, "Disk I/O")
    } else if write_mbps > 5.0 && read_mbps > 10.0 {
        (HealthStatus::Warning, "Moderate disk I/O")
    } else {
        (HealthStatus::Warning, "Slow disk I/O")
    }
}

struct NetworkLatency;

impl HealthCheck for NetworkLatency {
    fn name(&self) -> &'static str {
        "network_latency"
    }

    fn category(&self) -> HealthCategory {
        HealthCategory::Performance
    }

    fn run(&self, ctx: &DiagnosticsContext) -> Result<HealthResult> {
        let address = &ctx.settings.probe_address;
        let resolved = address.to_socket_addrs().ok().and_then(|mut addrs| addrs.next());
        let Some(addr) = resolved else {
            return Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Warning,
                format!("Latency probe skipped: {address} did not resolve"),
            ));
        };
        let started = Instant::now();
        match TcpStream::connect_timeout(&addr, ctx.settings.connect_timeout()) {
            Ok(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let (status, label) = latency_tier(elapsed_ms);
                let message = format!("Network latency {label}: {elapsed_ms}ms");
                if status == HealthStatus::Healthy {
                    Ok(check_result(self.name(), self.category(), status, message))
                } else {
                    Ok(with_fix(
                        check_result(self.name(), self.category(), status, message),
                        "Check for network congestion",
                    ))
                }
            }
            Err(err) => Ok(check_result(
                self.name(),
                self.category(),
                HealthStatus::Warning,
                format!("Latency probe failed: {err}"),
            )),
        }
    }
}

fn latency_tier(elapsed_ms: u64) -> (HealthStatus, &'static str) {
    if elapsed_ms < 50 {
        (HealthStatus::Healthy, "excellent")
    } else if elapsed_ms < 100 {
        (HealthStatus::Healthy, "good")
    } else if elapsed_ms < 200 {
        (HealthStatus::Warning, "moderate")
    } else {
        (HealthStatus::Warning, "slow")
    }
}

fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
