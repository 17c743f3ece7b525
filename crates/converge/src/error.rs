//! Error types for provisioning operations.
//!
//! Errors are categorized so the caller can tell a hard-required step that
//! failed on the host apart from a transport that never reached it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for converge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provisioning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A remote command exited non-zero and the step was hard-required.
    Command,
    /// The connection to the host could not be used.
    Transport,
    /// A local payload file shipped to the host is missing.
    Payload,
    /// A probe produced data that could not be interpreted.
    Probe,
    /// Malformed input (version strings, selectors).
    Input,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Command => "Remote command failed",
            Self::Transport => "Connection problem",
            Self::Payload => "Missing payload file",
            Self::Probe => "Inconclusive probe",
            Self::Input => "Invalid input",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Command => "Inspect the command output above and re-run the task",
            Self::Transport => "Check that `ssh <host>` works without a password prompt",
            Self::Payload => "Run from the repository root or set payload_dir in the config",
            Self::Probe => "The host may not be Ubuntu/Debian",
            Self::Input => "Check the value passed on the command line",
        }
    }
}

/// Errors that can occur while provisioning a host.
#[derive(Debug, Error)]
pub enum Error {
    /// A hard-required command exited non-zero
    #[error("command failed (exit {status}): {command}")]
    CommandFailed {
        /// The command line as sent to the host
        command: String,
        /// Exit status, or -1 when terminated by a signal
        status: i32,
        /// Combined output captured from the command
        output: String,
    },

    /// The transport could not run the command at all
    #[error("transport error: {message}")]
    Transport {
        /// What went wrong while talking to the host
        message: String,
    },

    /// A payload file to upload does not exist locally
    #[error("payload file not found: {}", path.display())]
    Payload {
        /// Local path that was expected to exist
        path: PathBuf,
    },

    /// A version string without any leading numeric component
    #[error("invalid version: {input:?}")]
    InvalidVersion {
        /// The rejected input
        input: String,
    },

    /// A probe returned something unusable
    #[error("probe failed: {message}")]
    Probe {
        /// Description of the unusable probe result
        message: String,
    },
}

impl Error {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::CommandFailed { .. } => ErrorCategory::Command,
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Payload { .. } => ErrorCategory::Payload,
            Self::InvalidVersion { .. } => ErrorCategory::Input,
            Self::Probe { .. } => ErrorCategory::Probe,
        }
    }

    /// Build a transport error from an I/O failure while spawning a command.
    pub fn transport(context: &str, err: &std::io::Error) -> Self {
        Self::Transport {
            message: format!("{context}: {err}"),
        }
    }
}
