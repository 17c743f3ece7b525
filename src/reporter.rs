//! Console rendering of dispatch progress

use colored::Colorize;
use converge::{Outcome, Reporter, RunSummary};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::ui;

/// Spinner while an action runs, one status line when it ends
pub struct ConsoleReporter {
    quiet: bool,
    spinner: Option<ProgressBar>,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            spinner: None,
        }
    }

    fn start_spinner(&mut self, message: String) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(pb);
    }

    /// Run `f` with the spinner out of the way
    fn suspended(&self, f: impl FnOnce()) {
        match &self.spinner {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn on_action_start(&mut self, name: &str, description: &str) {
        if !self.quiet {
            self.start_spinner(format!("{name}: {description}"));
        }
    }

    fn on_note(&mut self, name: &str, note: &str) {
        if self.quiet {
            return;
        }
        self.suspended(|| {
            ui::info(&format!("{name}:"));
            for line in note.lines() {
                ui::dim(line);
            }
        });
    }

    fn on_action_complete(&mut self, name: &str, outcome: &Outcome) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }

        match outcome {
            Outcome::Aborted { .. } => ui::error(&format!("{name}: {outcome}")),
            _ if self.quiet => {}
            Outcome::Done => ui::success(&format!("{name}: {outcome}")),
            Outcome::AlreadySatisfied { .. } => {
                println!("{} {name}: {outcome}", "✓".dimmed());
            }
            Outcome::PartiallyFailed { failures } => {
                ui::warn(&format!("{name}: {}", outcome.label()));
                for failure in failures {
                    ui::dim(failure);
                }
            }
            Outcome::Unsupported { .. } => ui::warn(&format!("{name}: {outcome}")),
            Outcome::Skipped { .. } => ui::info(&format!("{name}: {outcome}")),
        }
    }

    fn on_unknown_task(&mut self, selector: &str) {
        ui::error(&format!("no such task: {selector}"));
    }
}

/// Count lines for the end-of-run summary
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    [
        (summary.done, "installed"),
        (summary.partial, "installed with warnings"),
        (summary.already, "already installed"),
        (summary.unsupported, "unsupported"),
        (summary.skipped, "skipped"),
        (summary.aborted, "failed"),
        (summary.unknown_tasks, "unknown tasks"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect()
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    if summary.is_success() && summary.unknown_tasks == 0 {
        println!("  {} Host provisioned", "✓".green().bold());
    } else {
        println!("  {} Provisioning finished with errors", "⚠".yellow().bold());
    }

    for line in summary_lines(summary) {
        if line.ends_with("failed") {
            println!("    • {}", line.red());
        } else {
            println!("    • {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_summary_lines_skip_zero_counts() {
        let summary = RunSummary {
            done: 2,
            already: 9,
            aborted: 1,
            ..Default::default()
        };
        assert_eq!(
            summary_lines(&summary),
            vec!["2 installed", "9 already installed", "1 failed"]
        );
    }

    #[test]
    fn test_summary_lines_empty_run() {
        assert!(summary_lines(&RunSummary::default()).is_empty());
    }

    #[test]
    fn test_quiet_reporter_has_no_spinner() {
        let mut reporter = ConsoleReporter::new(true);
        reporter.on_action_start("bbr", "Enable TCP BBR");
        assert!(reporter.spinner.is_none());
        reporter.on_action_complete("bbr", &Outcome::Done);
    }
}
