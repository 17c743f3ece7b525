//! Executors that reach a real host
//!
//! - [`SshExecutor`]: one multiplexed SSH control connection per run
//! - [`LocalExecutor`]: the machine hostprep runs on

pub mod local;
pub mod ssh;

pub use local::LocalExecutor;
pub use ssh::{SshExecutor, SshTarget};

use anyhow::{Context, Result};
use converge::{CommandResult, Error, Executor};
use std::process::{Command, Output};

use crate::cli::TargetArgs;
use crate::config::{Config, expand};

/// Build the executor for this invocation
///
/// `--local` wins over any configured host; otherwise the command line
/// overrides `[connection]` field by field.
pub fn connect(args: &TargetArgs, config: &Config) -> Result<Box<dyn Executor>> {
    if args.local {
        log::info!("Provisioning the local machine");
        return Ok(Box::new(LocalExecutor::new()?));
    }

    let target = SshTarget::resolve(args, config)?;
    let executor = SshExecutor::connect(target)
        .context("Could not open the SSH control connection")?;
    Ok(Box::new(executor))
}

/// Spawn a prepared command and turn its exit into the executor contract
pub(crate) fn capture(
    mut cmd: Command,
    display: &str,
    tolerate_failure: bool,
) -> converge::Result<CommandResult> {
    let output = cmd
        .output()
        .map_err(|e| Error::transport(&format!("Failed to execute: {display}"), &e))?;
    finish(display, &output, tolerate_failure)
}

pub(crate) fn finish(display: &str, output: &Output, tolerate_failure: bool) -> converge::Result<CommandResult> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    log::debug!("$ {display}");
    for stream in [&stdout, &stderr] {
        if !stream.trim().is_empty() {
            log::debug!("{}", stream.trim_end());
        }
    }

    let mut result = CommandResult::ok(stdout)
        .with_stderr(stderr)
        .tolerated(tolerate_failure);
    if output.status.success() {
        return Ok(result);
    }
    result.succeeded = false;

    if tolerate_failure {
        log::warn!("command failed (tolerated): {display}");
        return Ok(result);
    }

    Err(Error::CommandFailed {
        command: display.to_string(),
        status: output.status.code().unwrap_or(-1),
        output: result.diagnostic().to_string(),
    })
}

/// Identity file from the command line, else from `[connection]`
pub(crate) fn identity_arg(args: &TargetArgs, config: &Config) -> Option<std::path::PathBuf> {
    args.identity
        .as_ref()
        .map(|p| expand(&p.to_string_lossy()))
        .or_else(|| config.connection.identity_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_keeps_streams_apart() {
        let result = capture(
            sh("echo 'mesg: ttyname failed' >&2; echo xenial"),
            "lsb_release -sc",
            false,
        )
        .unwrap();
        assert!(result.succeeded);
        assert_eq!(result.stdout, "xenial\n");
        assert_eq!(result.first_line(), "xenial");
        assert_eq!(result.stderr.trim(), "mesg: ttyname failed");
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_reports_stderr() {
        let err = capture(sh("echo partial; echo 'E: broken' >&2; exit 100"), "apt-get", false).unwrap_err();
        match err {
            Error::CommandFailed { status, output, .. } => {
                assert_eq!(status, 100);
                assert_eq!(output, "E: broken");
            }
            other => panic!("expected command failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_failure_contract() {
        let tolerated = capture(sh("exit 3"), "exit 3", true).unwrap();
        assert!(tolerated.failed());
        assert!(tolerated.warn_only);

        let err = capture(sh("exit 3"), "exit 3", false).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { status: 3, .. }));
    }

    #[test]
    fn test_spawn_failure_is_transport_error() {
        let err = capture(
            Command::new("/definitely/not/a/binary"),
            "missing",
            true,
        )
        .unwrap_err();
        assert_eq!(err.category(), converge::ErrorCategory::Transport);
    }
}
