pub mod automount;
pub mod checks;
pub mod classify;
pub mod context;
pub mod health;
pub mod model;
pub mod mounts;
pub(crate) mod pool;
pub mod probe;
pub mod render;
pub mod settings;
pub mod table;

pub use automount::{attempt_mount, mount_command};
pub use checks::builtin_checks;
pub use classify::{classify, mount_point_from_entry, split_options, RawMountEntry};
pub use context::{CredentialStore, DiagnosticsContext, MemoryCredentialStore};
pub use health::{HealthCheck, HealthChecker};
pub use model::{
    HealthCategory, HealthReport, HealthResult, HealthStatus, MountPoint, MountReport,
    MountStatus, StatusTransition, Transport, REPORT_VERSION,
};
pub use mounts::MountRegistry;
pub use probe::{FsProbe, PathProbe, ProbeError, ProbeOutcome};
pub use render::render_markdown_summary;
pub use settings::Settings;
pub use table::{MountTableSource, SystemTable};
