use std::fmt;

use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Local,
    Nfs,
    Cifs,
    Sshfs,
    #[default]
    Unknown,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Local => "local",
            Transport::Nfs => "nfs",
            Transport::Cifs => "cifs",
            Transport::Sshfs => "sshfs",
            Transport::Unknown => "unknown",
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Transport::Nfs | Transport::Cifs | Transport::Sshfs)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum MountStatus {
    #[default]
    Unknown,
    Healthy,
    Degraded,
    Unavailable,
}

impl MountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountStatus::Unknown => "unknown",
            MountStatus::Healthy => "healthy",
            MountStatus::Degraded => "degraded",
            MountStatus::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for MountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MountPoint {
    pub path: String,
    #[serde(default)]
    pub transport: Transport,
    pub device: String,
    pub filesystem: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub status: MountStatus,
    #[serde(default)]
    pub last_checked: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MountPoint {
    pub fn is_network(&self) -> bool {
        self.transport.is_network()
    }

    pub fn is_healthy(&self) -> bool {
        self.status == MountStatus::Healthy
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    Connectivity,
    Filesystem,
    Configuration,
    Dependencies,
    Performance,
    #[default]
    Unknown,
}

impl HealthCategory {
    /// Canonical execution ordering; `Unknown` is reserved for converted
    /// failures and is never scheduled.
    pub const ALL: [HealthCategory; 5] = [
        HealthCategory::Connectivity,
        HealthCategory::Filesystem,
        HealthCategory::Configuration,
        HealthCategory::Dependencies,
        HealthCategory::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthCategory::Connectivity => "connectivity",
            HealthCategory::Filesystem => "filesystem",
            HealthCategory::Configuration => "configuration",
            HealthCategory::Dependencies => "dependencies",
            HealthCategory::Performance => "performance",
            HealthCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResult {
    pub name: String,
    #[serde(default)]
    pub category: HealthCategory,
    #[serde(default)]
    pub status: HealthStatus,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub fix_suggestion: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default = "default_severity")]
    pub severity: u8,
}

fn default_severity() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub report_version: String,
    #[serde(default = "default_run_id")]
    pub run_id: String,
    pub generated_at: String,
    pub results: Vec<HealthResult>,
    #[serde(default)]
    pub healthy_count: u64,
    #[serde(default)]
    pub warning_count: u64,
    #[serde(default)]
    pub critical_count: u64,
    #[serde(default)]
    pub unknown_count: u64,
    #[serde(default)]
    pub total_duration_ms: u64,
}

fn default_run_id() -> String {
    "unknown".to_string()
}

impl HealthReport {
    pub fn new(run_id: String, generated_at: String) -> Self {
        Self {
            report_version: REPORT_VERSION.to_string(),
            run_id,
            generated_at,
            results: Vec::new(),
            healthy_count: 0,
            warning_count: 0,
            critical_count: 0,
            unknown_count: 0,
            total_duration_ms: 0,
        }
    }

    /// Appends one result and keeps the status counters partitioning the
    /// result list exactly.
    pub fn record(&mut self, result: HealthResult) {
        match result.status {
            HealthStatus::Healthy => self.healthy_count += 1,
            HealthStatus::Warning => self.warning_count += 1,
            HealthStatus::Critical => self.critical_count += 1,
            HealthStatus::Unknown => self.unknown_count += 1,
        }
        self.results.push(result);
    }

    pub fn total_checks(&self) -> u64 {
        self.results.len() as u64
    }

    /// Worst-case precedence: critical > warning > healthy > unknown.
    pub fn overall_status(&self) -> HealthStatus {
        if self.critical_count > 0 {
            HealthStatus::Critical
        } else if self.warning_count > 0 {
            HealthStatus::Warning
        } else if self.healthy_count > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }

    pub fn health_percentage(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            return 0.0;
        }
        self.healthy_count as f64 / total as f64 * 100.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MountReport {
    pub generated_at: String,
    #[serde(default)]
    pub total_mounts: u64,
    #[serde(default)]
    pub healthy_mounts: u64,
    #[serde(default)]
    pub degraded_mounts: u64,
    #[serde(default)]
    pub unavailable_mounts: u64,
    #[serde(default)]
    pub unknown_mounts: u64,
    #[serde(default)]
    pub network_mounts: u64,
    #[serde(default)]
    pub local_mounts: u64,
    #[serde(default)]
    pub mounts: Vec<MountPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusTransition {
    pub seq: u64,
    pub path: String,
    pub previous: MountStatus,
    pub current: MountStatus,
    pub at: String,
}
