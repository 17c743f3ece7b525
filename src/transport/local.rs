//! Local transport: the same executor contract through a local shell

use converge::{CommandResult, Executor, shell};
use std::path::Path;
use std::process::Command;

pub struct LocalExecutor {
    is_root: bool,
}

impl LocalExecutor {
    pub fn new() -> converge::Result<Self> {
        let mut id = Command::new("id");
        id.arg("-u");
        let uid = super::capture(id, "id -u", false)?;
        Ok(Self {
            is_root: uid.first_line() == "0",
        })
    }

    fn command(&self, command: &str, elevate: bool) -> Command {
        if elevate && !self.is_root {
            let mut cmd = Command::new("sudo");
            cmd.args(["-n", "bash", "-c", command]);
            cmd
        } else {
            let mut cmd = Command::new("bash");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

impl Executor for LocalExecutor {
    fn run(&self, command: &str, elevate: bool, tolerate_failure: bool) -> converge::Result<CommandResult> {
        super::capture(self.command(command, elevate), command, tolerate_failure)
    }

    fn put(&self, local: &Path, remote: &str, elevate: bool) -> converge::Result<()> {
        let local = local.display().to_string();
        let cp = format!("cp {} {}", shell::quote(&local), shell::quote(remote));
        self.run(&cp, elevate, false)?;
        Ok(())
    }

    fn describe(&self) -> String {
        "local machine".to_string()
    }
}
