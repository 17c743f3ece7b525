//! Core types for idempotent provisioning

use std::fmt;

/// Outcome of one remote command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command exited zero
    pub succeeded: bool,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error (login shell noise lands here too)
    pub stderr: String,
    /// Whether a failure of this command was tolerated by the caller
    pub warn_only: bool,
}

impl CommandResult {
    /// A successful result with the given standard output
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            stdout: stdout.into(),
            stderr: String::new(),
            warn_only: false,
        }
    }

    /// A failed result with the given standard error
    pub fn failed_with(stderr: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: stderr.into(),
            warn_only: false,
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Mark the result as produced by a failure-tolerant invocation
    pub fn tolerated(mut self, warn_only: bool) -> Self {
        self.warn_only = warn_only;
        self
    }

    pub fn failed(&self) -> bool {
        !self.succeeded
    }

    /// Standard output with surrounding whitespace removed
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// First non-blank line of standard output, trimmed
    ///
    /// Single-value queries (`id -un`, `uname -r`, `lsb_release -sc`) read
    /// their answer through this.
    pub fn first_line(&self) -> &str {
        self.stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
    }

    /// What to show when the command failed: stderr, else stdout
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout_trimmed()
        } else {
            stderr
        }
    }
}

/// Pointer width of the target host, as far as 64-bit-only software cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X64,
    X86,
}

impl Architecture {
    /// Label used in upstream download names (`node-v8-linux-x64.tar.xz`)
    pub fn download_label(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::X86 => "x86",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X64 => write!(f, "64-bit"),
            Self::X86 => write!(f, "32-bit"),
        }
    }
}

/// Terminal state of one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Detection found the desired end-state already in place
    AlreadySatisfied { details: String },
    /// The host cannot run this action (architecture, kernel, missing file)
    Unsupported { reason: String },
    /// Mutation completed
    Done,
    /// Mutation completed but best-effort steps failed
    PartiallyFailed { failures: Vec<String> },
    /// A hard-required step failed; later steps were not issued
    Aborted { error: String },
    /// Mutation was not attempted (dry run)
    Skipped { reason: String },
}

impl Outcome {
    /// Whether the action ended without a hard failure
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Aborted { .. })
    }

    /// Whether the action changed the host
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Done | Self::PartiallyFailed { .. })
    }

    /// Short status word for console output
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadySatisfied { .. } => "already installed",
            Self::Unsupported { .. } => "unsupported",
            Self::Done => "installed",
            Self::PartiallyFailed { .. } => "installed with warnings",
            Self::Aborted { .. } => "failed",
            Self::Skipped { .. } => "skipped",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySatisfied { details } if !details.is_empty() => {
                write!(f, "{} ({details})", self.label())
            }
            Self::Unsupported { reason } | Self::Skipped { reason } => {
                write!(f, "{}: {reason}", self.label())
            }
            Self::PartiallyFailed { failures } => {
                write!(f, "{}: {}", self.label(), failures.join("; "))
            }
            Self::Aborted { error } => write!(f, "{}: {error}", self.label()),
            _ => write!(f, "{}", self.label()),
        }
    }
}

/// Lifecycle of one action run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    NotStarted,
    Detecting,
    Mutating,
    Finished(Outcome),
}

impl ActionState {
    /// Whether moving from `self` to `next` is a legal transition
    ///
    /// `Detecting` may finish directly (satisfied, unsupported, skipped,
    /// aborted probe) while only `Mutating` may finish as done or partial.
    pub fn can_transition_to(&self, next: &ActionState) -> bool {
        match (self, next) {
            (Self::NotStarted, Self::Detecting) => true,
            (Self::Detecting, Self::Mutating) => true,
            (Self::Detecting, Self::Finished(outcome)) => matches!(
                outcome,
                Outcome::AlreadySatisfied { .. }
                    | Outcome::Unsupported { .. }
                    | Outcome::Skipped { .. }
                    | Outcome::Aborted { .. }
            ),
            (Self::Mutating, Self::Finished(outcome)) => matches!(
                outcome,
                Outcome::Done | Outcome::PartiallyFailed { .. } | Outcome::Aborted { .. }
            ),
            _ => false,
        }
    }
}

/// Counters over the outcomes of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub partial: usize,
    pub already: usize,
    pub unsupported: usize,
    pub skipped: usize,
    pub aborted: usize,
    pub unknown_tasks: usize,
}

impl RunSummary {
    /// Add an outcome to the summary
    pub fn add(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Done => self.done += 1,
            Outcome::PartiallyFailed { .. } => self.partial += 1,
            Outcome::AlreadySatisfied { .. } => self.already += 1,
            Outcome::Unsupported { .. } => self.unsupported += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Aborted { .. } => self.aborted += 1,
        }
    }

    /// Total number of actions that reached a terminal state
    pub fn total(&self) -> usize {
        self.done + self.partial + self.already + self.unsupported + self.skipped + self.aborted
    }

    /// Check if no action hard-failed
    pub fn is_success(&self) -> bool {
        self.aborted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success_and_change() {
        assert!(Outcome::Done.is_success());
        assert!(Outcome::Done.is_change());
        assert!(
            Outcome::PartiallyFailed {
                failures: vec!["x".into()]
            }
            .is_change()
        );
        assert!(
            !Outcome::Aborted {
                error: "boom".into()
            }
            .is_success()
        );
        assert!(
            !Outcome::AlreadySatisfied {
                details: String::new()
            }
            .is_change()
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = Outcome::Unsupported {
            reason: "mongodb only supports 64bit system".into(),
        };
        assert_eq!(
            outcome.to_string(),
            "unsupported: mongodb only supports 64bit system"
        );
        assert_eq!(
            Outcome::AlreadySatisfied {
                details: String::new()
            }
            .to_string(),
            "already installed"
        );
    }

    #[test]
    fn test_state_transitions() {
        use ActionState::*;
        assert!(NotStarted.can_transition_to(&Detecting));
        assert!(Detecting.can_transition_to(&Mutating));
        assert!(Detecting.can_transition_to(&Finished(Outcome::AlreadySatisfied {
            details: String::new()
        })));
        assert!(!Detecting.can_transition_to(&Finished(Outcome::Done)));
        assert!(Mutating.can_transition_to(&Finished(Outcome::Done)));
        assert!(!Mutating.can_transition_to(&Finished(Outcome::AlreadySatisfied {
            details: String::new()
        })));
        assert!(!NotStarted.can_transition_to(&Mutating));
        assert!(!Finished(Outcome::Done).can_transition_to(&Detecting));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RunSummary::default();
        summary.add(&Outcome::Done);
        summary.add(&Outcome::AlreadySatisfied {
            details: String::new(),
        });
        summary.add(&Outcome::Aborted {
            error: "x".into(),
        });
        assert_eq!(summary.total(), 3);
        assert!(!summary.is_success());
    }

    #[test]
    fn test_stderr_stays_out_of_answers() {
        let result = CommandResult::ok("\nxenial\n")
            .with_stderr("mesg: ttyname failed: Inappropriate ioctl for device\n");
        assert_eq!(result.first_line(), "xenial");
        assert_eq!(result.stdout_trimmed(), "xenial");
        assert_eq!(
            result.diagnostic(),
            "mesg: ttyname failed: Inappropriate ioctl for device"
        );
        assert_eq!(CommandResult::ok("").first_line(), "");
    }

    #[test]
    fn test_diagnostic_falls_back_to_stdout() {
        let result = CommandResult::failed_with("").with_stdout("E: Unable to locate package\n");
        assert_eq!(result.diagnostic(), "E: Unable to locate package");
    }

    #[test]
    fn test_architecture_labels() {
        assert_eq!(Architecture::X64.to_string(), "64-bit");
        assert_eq!(Architecture::X86.download_label(), "x86");
    }
}
