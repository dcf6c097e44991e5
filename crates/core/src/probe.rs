use std::fs;
use std::io;
use std::path::Path;
use std::time::Instant;

use thiserror::Error;

use crate::model::MountStatus;
use crate::settings::Settings;

/// Failure classes a probe can observe. Everything here is recovered at the
/// point of origin and recorded as entity state; nothing escapes the probe
/// APIs as an unhandled error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Mount point does not exist")]
    NotFound,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Network mount disconnected")]
    TransportDisconnected,
    #[error("Network host unreachable")]
    HostUnreachable,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("probe timed out after {0}s")]
    Timeout(u64),
    #[error("Health check failed: {0}")]
    Failure(String),
}

impl ProbeError {
    /// Status a listing-stage failure maps to. Permission trouble on a mount
    /// that exists means reachable-but-restricted, which is degradation;
    /// everything else here means the mount cannot be used.
    pub fn mount_status(&self) -> MountStatus {
        match self {
            ProbeError::PermissionDenied => MountStatus::Degraded,
            _ => MountStatus::Unavailable,
        }
    }
}

/// Result of probing one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: MountStatus,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: MountStatus::Healthy,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn degraded(latency_ms: Option<u64>, error: impl Into<String>) -> Self {
        Self {
            status: MountStatus::Degraded,
            latency_ms,
            error: Some(error.into()),
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            status: MountStatus::Unavailable,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}

/// Sorts an I/O error into the probe taxonomy. Network filesystems surface
/// transport faults with distinctive kinds/messages; match both since the
/// message is all some fuse drivers give us.
pub fn classify_io_error(err: &io::Error) -> ProbeError {
    let message = err.to_string().to_lowercase();
    match err.kind() {
        io::ErrorKind::NotFound => ProbeError::NotFound,
        io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied,
        io::ErrorKind::NotConnected => ProbeError::TransportDisconnected,
        _ if message.contains("transport endpoint is not connected") => {
            ProbeError::TransportDisconnected
        }
        _ if message.contains("host is down") => ProbeError::HostUnreachable,
        _ => ProbeError::Io(err.to_string()),
    }
}

/// Latency tier classification for a successful listing. Slowness is
/// degradation, never unavailability.
pub fn classify_listing_latency(elapsed_ms: u64, healthy_ms: u64, slow_ms: u64) -> ProbeOutcome {
    if elapsed_ms < healthy_ms {
        ProbeOutcome::healthy(elapsed_ms)
    } else if elapsed_ms <= slow_ms {
        ProbeOutcome::degraded(Some(elapsed_ms), format!("Slow response: {elapsed_ms}ms"))
    } else {
        ProbeOutcome::degraded(
            Some(elapsed_ms),
            format!("Very slow response: {elapsed_ms}ms"),
        )
    }
}

/// Filesystem access seam for the registry and the monitor loop. Tests swap
/// in scripted implementations to simulate latency and transport faults.
pub trait PathProbe: Send + Sync {
    fn probe(&self, path: &Path) -> ProbeOutcome;
}

/// Real-filesystem prober: existence and readability pre-checks, then a timed
/// directory listing classified into latency tiers.
#[derive(Debug, Clone)]
pub struct FsProbe {
    healthy_ms: u64,
    slow_ms: u64,
}

impl FsProbe {
    pub fn new(healthy_ms: u64, slow_ms: u64) -> Self {
        Self {
            healthy_ms,
            slow_ms,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.healthy_latency_ms, settings.slow_latency_ms)
    }
}

impl PathProbe for FsProbe {
    fn probe(&self, path: &Path) -> ProbeOutcome {
        if let Err(err) = fs::metadata(path) {
            return match classify_io_error(&err) {
                ProbeError::NotFound => ProbeOutcome::unavailable(ProbeError::NotFound.to_string()),
                ProbeError::PermissionDenied => {
                    ProbeOutcome::unavailable("Mount point is not readable")
                }
                other => ProbeOutcome::unavailable(other.to_string()),
            };
        }

        let started = Instant::now();
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(err) => {
                return match classify_io_error(&err) {
                    // The path stats fine but the directory refuses to open:
                    // the dir-open stage still counts as the readability
                    // pre-check.
                    ProbeError::PermissionDenied => {
                        ProbeOutcome::unavailable("Mount point is not readable")
                    }
                    other => ProbeOutcome::unavailable(other.to_string()),
                };
            }
        };

        for entry in entries {
            if let Err(err) = entry {
                let classified = classify_io_error(&err);
                return match classified.mount_status() {
                    MountStatus::Degraded => ProbeOutcome::degraded(None, classified.to_string()),
                    _ => ProbeOutcome::unavailable(classified.to_string()),
                };
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        classify_listing_latency(elapsed_ms, self.healthy_ms, self.slow_ms)
    }
}
