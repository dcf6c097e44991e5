use sysinfo::Disks;

use crate::classify::{split_options, RawMountEntry};

/// Where the registry reads the OS mount table from. The native
/// implementation is swapped out in tests for scripted tables.
pub trait MountTableSource: Send + Sync {
    fn entries(&self) -> Vec<RawMountEntry>;
}

/// Native mount table: `/proc/self/mounts` on Linux (the only source that
/// carries mount options), sysinfo's disk list everywhere else.
#[derive(Debug, Default, Clone)]
pub struct SystemTable;

impl MountTableSource for SystemTable {
    fn entries(&self) -> Vec<RawMountEntry> {
        #[cfg(target_os = "linux")]
        {
            match std::fs::read_to_string("/proc/self/mounts") {
                Ok(data) => {
                    let entries = parse_mount_table(&data);
                    if !entries.is_empty() {
                        return entries;
                    }
                }
                Err(err) => {
                    tracing::debug!("mount table read failed, using sysinfo: {err}");
                }
            }
        }
        sysinfo_entries()
    }
}

fn sysinfo_entries() -> Vec<RawMountEntry> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| RawMountEntry {
            device: disk.name().to_string_lossy().to_string(),
            path: disk.mount_point().to_string_lossy().to_string(),
            filesystem: disk.file_system().to_string_lossy().to_string(),
            options: Vec::new(),
        })
        .collect()
}

fn parse_mount_table(data: &str) -> Vec<RawMountEntry> {
    data.lines()
        .filter_map(parse_mount_line)
        .filter(is_probe_worthy)
        .collect()
}

fn parse_mount_line(line: &str) -> Option<RawMountEntry> {
    let mut fields = line.split_whitespace();
    let device = unescape_mount_field(fields.next()?);
    let path = unescape_mount_field(fields.next()?);
    let filesystem = fields.next()?.to_string();
    let options = split_options(fields.next().unwrap_or(""));
    Some(RawMountEntry {
        device,
        path,
        filesystem,
        options,
    })
}

/// Keeps block-device and remote mounts, drops kernel pseudo-filesystems
/// (proc, cgroup, tmpfs and friends identify themselves with bare names).
fn is_probe_worthy(entry: &RawMountEntry) -> bool {
    entry.device.starts_with('/')
        || entry.device.contains(':')
        || NETWORK_FILESYSTEMS
            .iter()
            .any(|fs| entry.filesystem.starts_with(fs))
}

const NETWORK_FILESYSTEMS: &[&str] = &[
    "nfs",
    "cifs",
    "smb",
    "fuse.sshfs",
    "sshfs",
    "davfs",
    "webdav",
    "afp",
];

/// getmntent-style octal escapes used by the kernel for whitespace in paths.
fn unescape_mount_field(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}
