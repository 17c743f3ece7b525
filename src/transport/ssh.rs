//! SSH transport over a single control connection
//!
//! The first command opens a ControlMaster socket; every later `ssh` and
//! `scp` rides it, so a run costs one handshake. The master is closed when
//! the executor is dropped.

use anyhow::{Result, bail};
use converge::{CommandResult, Error, Executor, shell};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::cli::TargetArgs;
use crate::config::Config;

/// Exit status `ssh` reserves for its own failures
const SSH_ERROR_STATUS: i32 = 255;

/// Where a control socket lives; `%C` is a hash of host, port and user
const CONTROL_PATH: &str = "/tmp/hostprep-%C";

/// Staging directory for uploads that need elevation to move into place
const UPLOAD_STAGING: &str = "/tmp";

/// Resolved connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity: Option<PathBuf>,
    pub control_persist: String,
    pub strict_host_key_checking: String,
}

impl SshTarget {
    /// Merge command-line flags over `[connection]`
    pub fn resolve(args: &TargetArgs, config: &Config) -> Result<Self> {
        let connection = &config.connection;
        let Some(host) = args.host.clone().or_else(|| connection.host.clone()) else {
            bail!("No target host: pass --host, set HOSTPREP_HOST or [connection].host, or use --local");
        };

        Ok(Self {
            host,
            user: args.user.clone().or_else(|| connection.user.clone()),
            port: args.port.or(connection.port),
            identity: super::identity_arg(args, config),
            control_persist: connection.control_persist.clone(),
            strict_host_key_checking: connection.strict_host_key_checking.clone(),
        })
    }

    /// `user@host` or just `host`
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// `-o` options shared by `ssh` and `scp`
    fn options(&self) -> Vec<String> {
        let mut args = Vec::new();
        for option in [
            "ControlMaster=auto".to_string(),
            format!("ControlPath={CONTROL_PATH}"),
            format!("ControlPersist={}", self.control_persist),
            format!("StrictHostKeyChecking={}", self.strict_host_key_checking),
            "BatchMode=yes".to_string(),
            "ConnectTimeout=10".to_string(),
        ] {
            args.push("-o".to_string());
            args.push(option);
        }
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }

    /// Full `ssh` argument list for one remote command line
    pub fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.options();
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    /// Full `scp` argument list copying `local` to `remote`
    pub fn scp_args(&self, local: &Path, remote: &str) -> Vec<String> {
        let mut args = self.options();
        if let Some(port) = self.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args.push(local.display().to_string());
        args.push(format!("{}:{remote}", self.destination()));
        args
    }

    /// `ssh -O exit` argument list for closing the master
    fn exit_args(&self) -> Vec<String> {
        let mut args = self.options();
        args.push("-O".to_string());
        args.push("exit".to_string());
        args.push(self.destination());
        args
    }
}

/// Wrap a command for the remote login shell, with `sudo -n` when elevated
pub fn remote_command(command: &str, elevate: bool, is_root: bool) -> String {
    let wrapped = format!("bash -lc {}", shell::quote(command));
    if elevate && !is_root {
        format!("sudo -n {wrapped}")
    } else {
        wrapped
    }
}

/// Move a staged upload into place as a root-owned, world-readable file
pub fn install_staged(staged: &str, target: &str) -> String {
    let staged = shell::quote(staged);
    format!(
        "install -o root -g root -m 644 {staged} {} && rm -f {staged}",
        shell::quote(target)
    )
}

pub struct SshExecutor {
    target: SshTarget,
    is_root: bool,
}

impl SshExecutor {
    /// Open the control connection and learn whether we log in as root
    pub fn connect(target: SshTarget) -> converge::Result<Self> {
        log::info!("Connecting to {}", target.destination());
        let mut executor = Self {
            target,
            is_root: false,
        };
        let uid = executor.run("id -u", false, false)?;
        executor.is_root = uid.first_line() == "0";
        log::debug!(
            "Connected to {} (root: {})",
            executor.target.destination(),
            executor.is_root
        );
        Ok(executor)
    }

    fn ssh(&self, remote: &str, tolerate_failure: bool) -> converge::Result<CommandResult> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.target.ssh_args(remote)).stdin(Stdio::null());

        let output = cmd
            .output()
            .map_err(|e| Error::transport("Failed to execute ssh", &e))?;

        if output.status.code() == Some(SSH_ERROR_STATUS) {
            return Err(Error::Transport {
                message: format!(
                    "ssh to {} failed: {}",
                    self.target.destination(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        super::finish(remote, &output, tolerate_failure)
    }
}

impl Executor for SshExecutor {
    fn run(&self, command: &str, elevate: bool, tolerate_failure: bool) -> converge::Result<CommandResult> {
        self.ssh(&remote_command(command, elevate, self.is_root), tolerate_failure)
    }

    fn put(&self, local: &Path, remote: &str, elevate: bool) -> converge::Result<()> {
        let file_name = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Payload {
                path: local.to_path_buf(),
            })?;

        if !elevate || self.is_root {
            let mut cmd = Command::new("scp");
            cmd.args(self.target.scp_args(local, remote));
            super::capture(cmd, &format!("scp {} {remote}", local.display()), false)?;
            return Ok(());
        }

        let staged = format!("{UPLOAD_STAGING}/hostprep-{file_name}");
        let mut cmd = Command::new("scp");
        cmd.args(self.target.scp_args(local, &staged));
        super::capture(cmd, &format!("scp {} {staged}", local.display()), false)?;

        let target = if remote.ends_with('/') {
            format!("{remote}{file_name}")
        } else {
            remote.to_string()
        };
        self.run(&install_staged(&staged, &target), true, false)?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.target.destination()
    }
}

impl Drop for SshExecutor {
    fn drop(&mut self) {
        let status = Command::new("ssh")
            .args(self.target.exit_args())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            log::debug!("Could not close control connection: {e}");
        }
    }
}
