//! Request-scoped run context
//!
//! One [`Run`] exists per invocation. It owns the host facts cache, so facts
//! are probed at most once and every action in the run sees the same
//! snapshot. Nothing in it outlives the process.

use crate::error::Result;
use crate::executor::Executor;
use crate::facts::HostFacts;
use crate::shell;
use crate::types::CommandResult;
use std::cell::OnceCell;

/// Context passed explicitly to every action of one run
pub struct Run<'a> {
    exec: &'a dyn Executor,
    facts: OnceCell<HostFacts>,
    dry_run: bool,
}

impl<'a> Run<'a> {
    pub fn new(exec: &'a dyn Executor) -> Self {
        Self {
            exec,
            facts: OnceCell::new(),
            dry_run: false,
        }
    }

    /// Stop every action after detection
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn executor(&self) -> &dyn Executor {
        self.exec
    }

    /// Host facts, probed on first access and memoized for the run
    pub fn facts(&self) -> Result<&HostFacts> {
        if let Some(facts) = self.facts.get() {
            return Ok(facts);
        }
        let probed = HostFacts::probe(self.exec)?;
        Ok(self.facts.get_or_init(|| probed))
    }

    /// Whether facts have been probed yet in this run
    pub fn facts_loaded(&self) -> bool {
        self.facts.get().is_some()
    }

    /// Side-effect-free check, failure tolerated
    pub fn probe(&self, command: &str) -> Result<CommandResult> {
        self.exec.run(command, false, true)
    }

    /// Whether a probe exits zero
    pub fn holds(&self, command: &str) -> Result<bool> {
        Ok(self.probe(command)?.succeeded)
    }

    /// Single-value query such as `uname -r`
    ///
    /// `None` when the command failed or printed nothing, so callers can
    /// treat an inconclusive answer as unsupported.
    pub fn query(&self, command: &str) -> Result<Option<String>> {
        let result = self.probe(command)?;
        let answer = result.first_line();
        if result.failed() || answer.is_empty() {
            log::warn!("`{command}` gave no answer");
            return Ok(None);
        }
        Ok(Some(answer.to_string()))
    }

    /// Whether `bin` is on the host's PATH
    pub fn has_binary(&self, bin: &str) -> Result<bool> {
        self.holds(&shell::which(bin))
    }

    pub fn has_file(&self, path: &str) -> Result<bool> {
        self.holds(&shell::test_file(path))
    }

    /// Exact whole-line presence in a file
    pub fn has_line(&self, path: &str, line: &str) -> Result<bool> {
        self.holds(&shell::contains_line(path, line))
    }

    /// The subset of `lines` not yet present in `path`, in the given order
    pub fn missing_lines<'l, S: AsRef<str>>(&self, path: &str, lines: &'l [S]) -> Result<Vec<&'l str>> {
        let mut missing = Vec::new();
        for line in lines {
            let line = line.as_ref();
            if !self.has_line(path, line)? {
                missing.push(line);
            }
        }
        Ok(missing)
    }
}
