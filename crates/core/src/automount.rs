use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::model::{MountPoint, Transport};
use crate::mounts::MountRegistry;

const MOUNT_WAIT: Duration = Duration::from_secs(30);

/// Command line that would (re)attach the mount, or `None` when the
/// transport gives us nothing sensible to run.
pub fn mount_command(mount: &MountPoint) -> Option<Vec<String>> {
    let command: Vec<String> = match mount.transport {
        Transport::Nfs => vec![
            "mount".to_string(),
            "-t".to_string(),
            "nfs".to_string(),
            mount.device.clone(),
            mount.path.clone(),
        ],
        Transport::Cifs => {
            let options = if mount.options.is_empty() {
                "defaults".to_string()
            } else {
                mount.options.join(",")
            };
            vec![
                "mount".to_string(),
                "-t".to_string(),
                "cifs".to_string(),
                mount.device.clone(),
                mount.path.clone(),
                "-o".to_string(),
                options,
            ]
        }
        Transport::Sshfs => vec![
            "sshfs".to_string(),
            mount.device.clone(),
            mount.path.clone(),
        ],
        Transport::Local => vec![
            "mount".to_string(),
            mount.device.clone(),
            mount.path.clone(),
        ],
        Transport::Unknown => return None,
    };
    Some(command)
}

/// Tries to bring a known mount back, then reports whether it probes healthy.
/// Paths the registry does not know, and transports without a mount command,
/// are not an error; they just return `false`.
pub fn attempt_mount(registry: &MountRegistry, path: &str) -> Result<bool> {
    let Some(mount) = registry.mounts()?.into_iter().find(|mount| mount.path == path) else {
        debug!("auto-mount skipped: {path} is not a known mount");
        return Ok(false);
    };
    let Some(command) = mount_command(&mount) else {
        debug!(
            "auto-mount skipped: no mount command for {} transport on {path}",
            mount.transport
        );
        return Ok(false);
    };

    info!("attempting to mount {path}: {}", command.join(" "));
    if !run_with_deadline(&command, MOUNT_WAIT)? {
        return Ok(false);
    }

    registry.discover()?;
    let refreshed = registry.check(path)?;
    info!("mount attempt for {path} finished: {}", refreshed.status);
    Ok(refreshed.is_healthy())
}

fn run_with_deadline(command: &[String], deadline: Duration) -> Result<bool> {
    let (program, args) = command.split_first().context("empty mount command")?;
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    let limit = Instant::now() + deadline;
    loop {
        match child.try_wait().context("failed to poll mount command")? {
            Some(status) if status.success() => return Ok(true),
            Some(status) => {
                let mut stderr = String::new();
                if let Some(mut pipe) = child.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr);
                }
                warn!("mount command failed ({status}): {}", stderr.trim());
                return Ok(false);
            }
            None if Instant::now() >= limit => {
                warn!(
                    "mount command exceeded {}s; killing it",
                    deadline.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
                return Ok(false);
            }
            None => thread::sleep(Duration::from_millis(100)),
        }
    }
}
