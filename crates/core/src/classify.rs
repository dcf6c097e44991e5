use crate::model::{MountPoint, MountStatus, Transport};

/// One raw OS mount-table record before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMountEntry {
    pub device: String,
    pub path: String,
    pub filesystem: String,
    pub options: Vec<String>,
}

const CIFS_FILESYSTEMS: &[&str] = &["cifs", "smb", "smbfs"];

/// Maps a mount-table record to its transport. Pure; first match wins and
/// every input classifies (worst case `unknown`).
pub fn classify(filesystem: &str, device: &str) -> Transport {
    let fs = filesystem.trim().to_lowercase();
    let device = device.trim().to_lowercase();

    if fs.contains("nfs") {
        return Transport::Nfs;
    }
    if CIFS_FILESYSTEMS.contains(&fs.as_str()) {
        return Transport::Cifs;
    }
    if fs == "fuse.sshfs" || device.contains("sshfs") {
        return Transport::Sshfs;
    }
    // host:path device syntax without a cooperating fs type is almost always
    // an NFS-style remote.
    if device.contains(':') && !device.starts_with('/') {
        return Transport::Nfs;
    }
    if device.starts_with("/dev/") {
        return Transport::Local;
    }
    Transport::Unknown
}

/// Splits a comma-separated mount options string, dropping empty segments.
pub fn split_options(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|option| option.trim())
        .filter(|option| !option.is_empty())
        .map(|option| option.to_string())
        .collect()
}

/// Builds the registry entity for a raw table record. Status stays `unknown`
/// until a probe has run against the path.
pub fn mount_point_from_entry(entry: RawMountEntry) -> MountPoint {
    let transport = classify(&entry.filesystem, &entry.device);
    MountPoint {
        path: entry.path,
        transport,
        device: entry.device,
        filesystem: entry.filesystem,
        options: entry.options,
        status: MountStatus::Unknown,
        last_checked: None,
        latency_ms: None,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, mount_point_from_entry, split_options, RawMountEntry};
    use crate::model::{MountStatus, Transport};

    #[test]
    fn classifies_nfs_variants_by_filesystem() {
        assert_eq!(classify("nfs", "server:/export"), Transport::Nfs);
        assert_eq!(classify("nfs4", "server:/export"), Transport::Nfs);
        assert_eq!(classify("NFS", "server:/export"), Transport::Nfs);
    }

    #[test]
    fn classifies_cifs_by_exact_filesystem_match() {
        assert_eq!(classify("cifs", "//server/share"), Transport::Cifs);
        assert_eq!(classify("smb", "//server/share"), Transport::Cifs);
        assert_eq!(classify("smbfs", "//server/share"), Transport::Cifs);
        // Not a member of the cifs set; falls through to the device rules.
        assert_eq!(classify("smbx", "/dev/sda1"), Transport::Local);
    }

    #[test]
    fn classifies_sshfs_by_filesystem_or_device() {
        assert_eq!(classify("fuse.sshfs", "user@host:/srv"), Transport::Sshfs);
        assert_eq!(classify("fuse", "sshfs#user@host:/srv"), Transport::Sshfs);
    }

    #[test]
    fn remote_device_syntax_defaults_to_nfs() {
        assert_eq!(classify("ext4", "server:/volume1/media"), Transport::Nfs);
        // A colon in an absolute device path is not remote syntax.
        assert_eq!(classify("ext4", "/dev/disk:by-id"), Transport::Local);
    }

    #[test]
    fn dev_devices_are_local_and_everything_else_unknown() {
        assert_eq!(classify("ext4", "/dev/sda1"), Transport::Local);
        assert_eq!(classify("btrfs", "/dev/mapper/vg-data"), Transport::Local);
        assert_eq!(classify("tmpfs", "tmpfs"), Transport::Unknown);
        assert_eq!(classify("", ""), Transport::Unknown);
    }

    #[test]
    fn filesystem_rules_win_over_device_rules() {
        // Rule order matters: an nfs filesystem on a /dev/ device stays nfs.
        assert_eq!(classify("nfs", "/dev/loop0"), Transport::Nfs);
    }

    #[test]
    fn splits_option_strings() {
        assert_eq!(
            split_options("rw,relatime,vers=4.2"),
            vec!["rw", "relatime", "vers=4.2"]
        );
        assert_eq!(split_options("rw, ,noatime,"), vec!["rw", "noatime"]);
        assert!(split_options("").is_empty());
    }

    #[test]
    fn entry_builds_unprobed_mount_point() {
        let entry = RawMountEntry {
            device: "server:/export".to_string(),
            path: "/mnt/media".to_string(),
            filesystem: "nfs4".to_string(),
            options: vec!["rw".to_string()],
        };
        let mount = mount_point_from_entry(entry);
        assert_eq!(mount.path, "/mnt/media");
        assert_eq!(mount.transport, Transport::Nfs);
        assert_eq!(mount.status, MountStatus::Unknown);
        assert!(mount.is_network());
        assert!(mount.last_checked.is_none());
        assert!(mount.latency_ms.is_none());
    }
}
