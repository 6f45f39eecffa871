//! Helm values files.
//!
//! The base file is read-only input. Overrides are applied in memory and the
//! result is written to a separate temp file that the installer consumes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_yaml::Value;
use tracing::{debug, info};

use crate::types::{ChartConfiguration, ValuesMap};
use crate::workflow::ConfigurationCollector;

pub const BASE_VALUES_FILE: &str = "helm-values.yaml";
pub const TEMP_VALUES_FILE: &str = "helm-values-tmp.yaml";

/// Key holding the branch the app-of-apps chart tracks.
pub const BRANCH_VALUES_PATH: &str = "deployment.oss.repository.branch";

/// Load a values file. A missing file yields an empty mapping.
pub fn load_values(path: &Path) -> anyhow::Result<ValuesMap> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Values file not found, using empty values");
            return Ok(ValuesMap::new());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read values file: {}", path.display()));
        }
    };

    if content.trim().is_empty() {
        return Ok(ValuesMap::new());
    }

    match serde_yaml::from_str::<Value>(&content)
        .with_context(|| format!("Failed to parse values file: {}", path.display()))?
    {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(ValuesMap::new()),
        _ => anyhow::bail!(
            "Values file {} must contain a mapping at the top level",
            path.display()
        ),
    }
}

pub fn write_values(path: &Path, values: &ValuesMap) -> anyhow::Result<()> {
    let content = serde_yaml::to_string(values).context("Failed to serialize values to YAML")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write values file: {}", path.display()))
}

/// Look up a dotted path such as `deployment.oss.repository.branch`.
pub fn get_path<'a>(values: &'a ValuesMap, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = values.get(first)?;
    for segment in segments {
        current = current.as_mapping()?.get(segment)?;
    }
    Some(current)
}

/// Set a dotted path, creating intermediate mappings.
///
/// Fails if an intermediate key holds a non-mapping value. Returns whether the
/// stored value changed.
pub fn set_path(values: &mut ValuesMap, path: &str, value: Value) -> anyhow::Result<bool> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        anyhow::bail!("Invalid values path: '{}'", path);
    }

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| anyhow::anyhow!("Invalid values path: '{}'", path))?;

    let mut current = values;
    for (depth, segment) in parents.iter().enumerate() {
        let entry = current
            .entry(Value::from(*segment))
            .or_insert(Value::Mapping(ValuesMap::new()));
        current = match entry {
            Value::Mapping(map) => map,
            _ => anyhow::bail!(
                "Cannot set '{}': '{}' is not a mapping",
                path,
                segments[..=depth].join(".")
            ),
        };
    }

    let key = Value::from(*last);
    if current.get(&key) == Some(&value) {
        return Ok(false);
    }
    current.insert(key, value);
    Ok(true)
}

/// A single value to force into the generated values file.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesOverride {
    pub path: String,
    pub value: Value,
}

impl ValuesOverride {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn branch(branch: &str) -> Self {
        Self::new(BRANCH_VALUES_PATH, branch)
    }

    /// Top-level section the override touches.
    pub fn section(&self) -> &str {
        self.path.split('.').next().unwrap_or(&self.path)
    }
}

/// Non-interactive collector: base values plus fixed overrides.
#[derive(Debug, Clone)]
pub struct ValuesFileCollector {
    base_path: PathBuf,
    temp_path: PathBuf,
    overrides: Vec<ValuesOverride>,
}

impl ValuesFileCollector {
    pub fn new(base_path: impl Into<PathBuf>, temp_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            temp_path: temp_path.into(),
            overrides: Vec::new(),
        }
    }

    pub fn with_override(mut self, value: ValuesOverride) -> Self {
        self.overrides.push(value);
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }
}

impl ConfigurationCollector for ValuesFileCollector {
    fn collect(&self) -> anyhow::Result<ChartConfiguration> {
        let existing_values = load_values(&self.base_path)?;
        let mut values = existing_values.clone();
        let mut modified_sections: Vec<String> = Vec::new();

        for item in &self.overrides {
            if set_path(&mut values, &item.path, item.value.clone())? {
                debug!(path = %item.path, "Applied values override");
                let section = item.section().to_string();
                if !modified_sections.contains(&section) {
                    modified_sections.push(section);
                }
            }
        }

        if let Err(e) = write_values(&self.temp_path, &values) {
            // A partial write must not outlive a failed collection.
            let _ = fs::remove_file(&self.temp_path);
            return Err(e);
        }
        info!(path = %self.temp_path.display(), "Generated values file");

        Ok(ChartConfiguration {
            base_values_path: self.base_path.clone(),
            temp_values_path: Some(self.temp_path.clone()),
            existing_values,
            modified_sections,
        })
    }

    fn load_base_values(&self) -> anyhow::Result<ValuesMap> {
        load_values(&self.base_path)
    }
}
