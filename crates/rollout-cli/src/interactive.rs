//! Terminal prompts for the install command.
//!
//! Target selection and the go-ahead prompt use dialoguer. Both are skipped
//! when `--yes` is passed or the answer is already determined by arguments.

use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, Select, theme::ColorfulTheme};

use rollout_core::providers::{ArgsTargetSelector, list_contexts};
use rollout_core::types::InstallationRequest;
use rollout_core::workflow::{ConfirmationPrompt, TargetSelector};

const NONE_ENTRY: &str = "none (exit)";

/// Picks the target from arguments, or from a list of kube contexts.
pub struct InteractiveTargetSelector {
    /// Fixed context list; queried from kubectl when `None`
    contexts: Option<Vec<String>>,
    yes: bool,
}

impl InteractiveTargetSelector {
    pub fn new(yes: bool) -> Self {
        Self {
            contexts: None,
            yes,
        }
    }

    #[cfg(test)]
    pub fn with_contexts(contexts: Vec<String>, yes: bool) -> Self {
        Self {
            contexts: Some(contexts),
            yes,
        }
    }

    fn contexts(&self) -> Result<Vec<String>> {
        match &self.contexts {
            Some(contexts) => Ok(contexts.clone()),
            None => list_contexts(),
        }
    }
}

impl TargetSelector for InteractiveTargetSelector {
    fn select(&self, args: &[String], verbose: bool) -> Result<Option<String>> {
        let contexts = self.contexts()?;
        let has_arg = args.iter().any(|a| !a.trim().is_empty());

        if has_arg || self.yes || contexts.len() <= 1 {
            return ArgsTargetSelector::with_contexts(contexts).select(args, verbose);
        }

        let mut items: Vec<&str> = contexts.iter().map(String::as_str).collect();
        items.push(NONE_ENTRY);

        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select target cluster")
            .items(&items)
            .default(0)
            .interact()?;

        Ok(contexts.get(selection).cloned())
    }
}

/// Shows the install summary and asks for the go-ahead.
pub struct InteractiveConfirmation<W: Write + Send = io::Stdout> {
    summary: Summary,
    yes: bool,
    writer: Mutex<W>,
}

/// Request details shown before confirmation.
#[derive(Debug, Clone)]
pub struct Summary {
    pub repository: String,
    pub branch: String,
    pub dry_run: bool,
    pub force: bool,
    /// Suppress the summary
    pub silent: bool,
}

impl Summary {
    pub fn from_request(request: &InstallationRequest) -> Self {
        Self {
            repository: request.repository.url.clone(),
            branch: request.repository.branch.clone(),
            dry_run: request.dry_run,
            force: request.force,
            silent: request.silent,
        }
    }
}

impl InteractiveConfirmation<io::Stdout> {
    pub fn new(summary: Summary, yes: bool) -> Self {
        Self {
            summary,
            yes,
            writer: Mutex::new(io::stdout()),
        }
    }
}

impl<W: Write + Send> InteractiveConfirmation<W> {
    #[cfg(test)]
    pub fn with_writer(summary: Summary, yes: bool, writer: W) -> Self {
        Self {
            summary,
            yes,
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    pub fn into_writer(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn print_summary(&self, target: &str) -> Result<()> {
        if self.summary.silent {
            return Ok(());
        }
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("Output writer is poisoned"))?;
        let s = &self.summary;

        writeln!(writer)?;
        writeln!(writer, "{}", style("  Installation Summary").bold())?;
        writeln!(writer, "  ───────────────────────────")?;
        writeln!(writer, "  Target:     {}", style(target).green())?;
        writeln!(writer, "  Repository: {}", style(&s.repository).green())?;
        writeln!(writer, "  Branch:     {}", style(&s.branch).green())?;
        if s.dry_run {
            writeln!(writer, "  Mode:       {}", style("dry run").yellow())?;
        }
        if s.force {
            writeln!(writer, "  Force:      {}", style("yes").yellow())?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> ConfirmationPrompt for InteractiveConfirmation<W> {
    fn confirm(&self, target: &str) -> Result<bool> {
        self.print_summary(target)?;

        if self.yes {
            return Ok(true);
        }

        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Install charts on '{}'?", target))
            .default(false)
            .interact()?;

        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> Summary {
        Summary {
            repository: "https://github.com/acme/platform".to_string(),
            branch: "develop".to_string(),
            dry_run: true,
            force: false,
            silent: false,
        }
    }

    #[test]
    fn test_yes_flag_skips_confirmation() {
        let prompt = InteractiveConfirmation::with_writer(summary(), true, Vec::new());
        assert!(prompt.confirm("k3d-dev").unwrap());
    }

    #[test]
    fn test_summary_output_format() {
        let prompt = InteractiveConfirmation::with_writer(summary(), true, Vec::new());
        prompt.confirm("k3d-dev").unwrap();

        let output = String::from_utf8(prompt.into_writer()).unwrap();
        assert!(output.contains("Installation Summary"));
        assert!(output.contains("k3d-dev"));
        assert!(output.contains("develop"));
        assert!(output.contains("dry run"));
        assert!(!output.contains("Force"));
    }

    #[test]
    fn test_silent_suppresses_summary() {
        let quiet = Summary {
            silent: true,
            ..summary()
        };
        let prompt = InteractiveConfirmation::with_writer(quiet, true, Vec::new());
        assert!(prompt.confirm("k3d-dev").unwrap());

        assert!(prompt.into_writer().is_empty());
    }

    #[test]
    fn test_argument_selects_target() {
        let selector = InteractiveTargetSelector::with_contexts(
            vec!["k3d-dev".to_string(), "k3d-prod".to_string()],
            false,
        );
        let picked = selector.select(&["k3d-prod".to_string()], false).unwrap();
        assert_eq!(picked.as_deref(), Some("k3d-prod"));
    }

    #[test]
    fn test_single_context_auto_selects() {
        let selector = InteractiveTargetSelector::with_contexts(vec!["k3d-dev".to_string()], false);
        let picked = selector.select(&[], false).unwrap();
        assert_eq!(picked.as_deref(), Some("k3d-dev"));
    }

    #[test]
    fn test_yes_with_multiple_contexts_requires_argument() {
        let selector = InteractiveTargetSelector::with_contexts(
            vec!["a".to_string(), "b".to_string()],
            true,
        );
        assert!(selector.select(&[], false).is_err());
    }
}
