use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime tuning for the registry, the monitor loop and the orchestrator.
/// Every threshold the health checks compare against lives here so a
/// deployment can override it; the defaults are the compatibility values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_monitor_workers")]
    pub monitor_workers: usize,
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,
    #[serde(default = "default_mount_check_timeout_secs")]
    pub mount_check_timeout_secs: u64,
    #[serde(default = "default_parallel_health_checks")]
    pub parallel_health_checks: bool,
    #[serde(default = "default_healthy_latency_ms")]
    pub healthy_latency_ms: u64,
    #[serde(default = "default_slow_latency_ms")]
    pub slow_latency_ms: u64,
    /// Candidate paths whose backing mounts the filesystem checks probe.
    #[serde(default)]
    pub source_paths: Vec<PathBuf>,
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_probe_address")]
    pub probe_address: String,
    #[serde(default = "default_probe_host")]
    pub probe_host: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_low_space_bytes")]
    pub low_space_bytes: u64,
    #[serde(default = "default_io_probe_bytes")]
    pub io_probe_bytes: u64,
    #[serde(default = "default_resource_warn_percent")]
    pub resource_warn_percent: f32,
}

fn default_check_interval_secs() -> u64 {
    30
}

fn default_monitor_workers() -> usize {
    4
}

fn default_join_timeout_secs() -> u64 {
    5
}

fn default_max_workers() -> usize {
    4
}

fn default_health_check_timeout_secs() -> u64 {
    10
}

fn default_mount_check_timeout_secs() -> u64 {
    5
}

fn default_parallel_health_checks() -> bool {
    true
}

fn default_healthy_latency_ms() -> u64 {
    100
}

fn default_slow_latency_ms() -> u64 {
    1000
}

fn workspace_root() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join(".mount-medic")
}

fn default_config_dir() -> PathBuf {
    workspace_root()
}

fn default_cache_dir() -> PathBuf {
    workspace_root().join("cache")
}

fn default_log_dir() -> PathBuf {
    workspace_root().join("logs")
}

fn default_backup_dir() -> PathBuf {
    workspace_root().join("backups")
}

fn default_temp_dir() -> PathBuf {
    env::temp_dir().join("mount-medic")
}

fn default_probe_address() -> String {
    "8.8.8.8:53".to_string()
}

fn default_probe_host() -> String {
    "google.com".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_low_space_bytes() -> u64 {
    1_073_741_824
}

fn default_io_probe_bytes() -> u64 {
    1_048_576
}

fn default_resource_warn_percent() -> f32 {
    90.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            monitor_workers: default_monitor_workers(),
            join_timeout_secs: default_join_timeout_secs(),
            max_workers: default_max_workers(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            mount_check_timeout_secs: default_mount_check_timeout_secs(),
            parallel_health_checks: default_parallel_health_checks(),
            healthy_latency_ms: default_healthy_latency_ms(),
            slow_latency_ms: default_slow_latency_ms(),
            source_paths: Vec::new(),
            config_dir: default_config_dir(),
            cache_dir: default_cache_dir(),
            log_dir: default_log_dir(),
            backup_dir: default_backup_dir(),
            temp_dir: default_temp_dir(),
            probe_address: default_probe_address(),
            probe_host: default_probe_host(),
            connect_timeout_secs: default_connect_timeout_secs(),
            low_space_bytes: default_low_space_bytes(),
            io_probe_bytes: default_io_probe_bytes(),
            resource_warn_percent: default_resource_warn_percent(),
        }
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Settings> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Collects every constraint violation instead of stopping at the first,
    /// so the configuration health check can report them all at once.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if self.check_interval_secs == 0 {
            violations.push("check_interval_secs must be greater than zero".to_string());
        }
        if self.monitor_workers == 0 {
            violations.push("monitor_workers must be greater than zero".to_string());
        }
        if self.max_workers == 0 {
            violations.push("max_workers must be greater than zero".to_string());
        }
        if self.health_check_timeout_secs == 0 {
            violations.push("health_check_timeout_secs must be greater than zero".to_string());
        }
        if self.mount_check_timeout_secs == 0 {
            violations.push("mount_check_timeout_secs must be greater than zero".to_string());
        }
        if self.healthy_latency_ms >= self.slow_latency_ms {
            violations.push(format!(
                "healthy_latency_ms ({}) must be below slow_latency_ms ({})",
                self.healthy_latency_ms, self.slow_latency_ms
            ));
        }
        if self.io_probe_bytes == 0 {
            violations.push("io_probe_bytes must be greater than zero".to_string());
        }
        if !(0.0..=100.0).contains(&self.resource_warn_percent) {
            violations.push(format!(
                "resource_warn_percent ({}) must be between 0 and 100",
                self.resource_warn_percent
            ));
        }
        violations
    }

    pub fn validate(&self) -> Result<()> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("invalid settings: {}", violations.join("; ")))
        }
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn mount_check_timeout(&self) -> Duration {
        Duration::from_secs(self.mount_check_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Directories the filesystem and configuration checks exercise.
    pub fn workspace_dirs(&self) -> Vec<(&'static str, &Path)> {
        vec![
            ("config", self.config_dir.as_path()),
            ("cache", self.cache_dir.as_path()),
            ("log", self.log_dir.as_path()),
            ("backup", self.backup_dir.as_path()),
            ("temp", self.temp_dir.as_path()),
        ]
    }
}
