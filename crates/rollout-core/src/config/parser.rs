//! TOML parser with helpful error messages

use super::RolloutSettings;
use anyhow::{Context, Result};
use std::path::Path;

/// Parse rollout.toml with detailed error messages
pub fn parse_settings(path: &Path) -> Result<RolloutSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    parse_settings_str(&content)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))
}

pub fn parse_settings_str(content: &str) -> Result<RolloutSettings> {
    let settings: RolloutSettings =
        toml::from_str(content).map_err(|e| enhance_toml_error(e, content))?;
    settings.validate()?;
    Ok(settings)
}

/// Attach the offending lines to a TOML error
fn enhance_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();

    let line_num = error
        .span()
        .map(|span| content[..span.start.min(content.len())].lines().count().max(1));

    match line_num {
        Some(line_num) => anyhow::anyhow!(
            "TOML parsing error at line {}:\n{}\n\nError: {}",
            line_num,
            line_context(content, line_num),
            message
        ),
        None => anyhow::anyhow!("TOML parsing error: {}", message),
    }
}

fn line_context(content: &str, line_num: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let start = line_num.saturating_sub(2).min(lines.len());
    let end = (line_num + 1).min(lines.len());

    lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let num = start + i + 1;
            let marker = if num == line_num { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, num, line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_toml(settings: &RolloutSettings) -> Result<String> {
    toml::to_string_pretty(settings).context("Failed to serialize settings to TOML")
}
