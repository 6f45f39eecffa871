//! Settings path resolution helpers.

use std::path::{Path, PathBuf};

pub const SETTINGS_FILE: &str = "rollout.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsScope {
    /// `<config dir>/rollout/rollout.toml`
    Global,
    /// `./rollout.toml`
    Project,
}

pub fn settings_path_for_scope(
    scope: SettingsScope,
    global_dir: &Path,
    project_root: &Path,
) -> PathBuf {
    match scope {
        SettingsScope::Global => global_dir.join(SETTINGS_FILE),
        SettingsScope::Project => project_root.join(SETTINGS_FILE),
    }
}

pub fn default_cert_dir(global_dir: &Path) -> PathBuf {
    global_dir.join("certs")
}
