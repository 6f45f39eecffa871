//! Settings store for loading and saving rollout.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use super::{
    RolloutSettings, parser,
    paths::{SettingsScope, default_cert_dir, settings_path_for_scope},
};

#[derive(Debug, Clone)]
pub struct SettingsStore {
    scope: SettingsScope,
    settings_path: PathBuf,
    global_dir: PathBuf,
}

impl SettingsStore {
    /// Resolve the store from the user config directory and the working directory.
    pub fn discover() -> anyhow::Result<Self> {
        let global_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("rollout");
        let project_root = std::env::current_dir()?;

        Ok(Self::from_dirs(global_dir, project_root))
    }

    /// Use the project file if it exists, the global file otherwise.
    pub fn from_dirs(global_dir: PathBuf, project_root: PathBuf) -> Self {
        let project = settings_path_for_scope(SettingsScope::Project, &global_dir, &project_root);
        let scope = if project.is_file() {
            SettingsScope::Project
        } else {
            SettingsScope::Global
        };
        Self::from_paths(scope, global_dir, project_root)
    }

    pub fn from_paths(scope: SettingsScope, global_dir: PathBuf, project_root: PathBuf) -> Self {
        let settings_path = settings_path_for_scope(scope, &global_dir, &project_root);
        Self {
            scope,
            settings_path,
            global_dir,
        }
    }

    pub fn scope(&self) -> SettingsScope {
        self.scope
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// Certificate directory used when settings do not name one.
    pub fn default_cert_dir(&self) -> PathBuf {
        default_cert_dir(&self.global_dir)
    }

    pub fn load(&self) -> anyhow::Result<RolloutSettings> {
        if !self.settings_path.exists() {
            debug!(path = %self.settings_path.display(), "No settings file, using defaults");
            return Ok(RolloutSettings::new());
        }
        parser::parse_settings(&self.settings_path)
    }

    pub fn save(&self, settings: &RolloutSettings) -> anyhow::Result<()> {
        settings.validate()?;
        let content = parser::to_toml(settings)?;
        if let Some(parent) = self.settings_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.settings_path, content).with_context(|| {
            format!(
                "Failed to write settings file: {}",
                self.settings_path.display()
            )
        })?;
        Ok(())
    }
}
