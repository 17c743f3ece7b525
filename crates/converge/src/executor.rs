//! The boundary through which every side effect reaches the host
//!
//! Implementations decide how a command travels (an SSH control connection,
//! a local shell, an in-memory model). Everything above this trait only
//! chooses *whether* a command is elevated and *whether* its failure is
//! tolerated.

use crate::error::Result;
use crate::types::CommandResult;
use std::path::Path;

/// Runs shell commands on exactly one target host
pub trait Executor {
    /// Run `command` through the host's shell
    ///
    /// With `elevate` the command runs with administrative privileges.
    /// A non-zero exit returns `Ok` with `succeeded == false` when
    /// `tolerate_failure` is set, and `Err(Error::CommandFailed)` otherwise.
    fn run(&self, command: &str, elevate: bool, tolerate_failure: bool) -> Result<CommandResult>;

    /// Copy a local file to `remote` on the host
    ///
    /// `remote` may name a directory (trailing `/`) or a full file path.
    fn put(&self, local: &Path, remote: &str, elevate: bool) -> Result<()>;

    /// Human-readable name of the target (e.g. `deploy@web1`)
    fn describe(&self) -> String;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn run(&self, command: &str, elevate: bool, tolerate_failure: bool) -> Result<CommandResult> {
        (**self).run(command, elevate, tolerate_failure)
    }

    fn put(&self, local: &Path, remote: &str, elevate: bool) -> Result<()> {
        (**self).put(local, remote, elevate)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn run(&self, command: &str, elevate: bool, tolerate_failure: bool) -> Result<CommandResult> {
        (**self).run(command, elevate, tolerate_failure)
    }

    fn put(&self, local: &Path, remote: &str, elevate: bool) -> Result<()> {
        (**self).put(local, remote, elevate)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
