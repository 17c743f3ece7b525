//! Idempotent actions and the driver that runs them
//!
//! Every action follows the same contract:
//! 1. **Detect** - side-effect-free probes decide whether the end-state holds
//! 2. **Decide** - satisfied or unsupported hosts short-circuit here
//! 3. **Mutate** - the minimal ordered command sequence, each step marked
//!    hard-required or best-effort
//!
//! [`apply`] drives an action through `NotStarted → Detecting →
//! {AlreadySatisfied | Mutating → {Done | PartiallyFailed | Aborted}}`.

use crate::error::{Error, Result};
use crate::facts::HostFacts;
use crate::reporter::Reporter;
use crate::run::Run;
use crate::shell;
use crate::types::{ActionState, CommandResult, Outcome};
use std::fmt;
use std::path::Path;

/// What detection found on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// Desired end-state already holds
    Satisfied { details: String },
    /// End-state missing; mutation needed
    Absent,
    /// The host cannot take this action
    Unsupported { reason: String },
}

impl Detection {
    pub fn satisfied(details: impl Into<String>) -> Self {
        Self::Satisfied {
            details: details.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// `Satisfied` when `holds`, otherwise `Absent`
    pub fn from_probe(holds: bool, details: impl Into<String>) -> Self {
        if holds {
            Self::satisfied(details)
        } else {
            Self::Absent
        }
    }
}

/// A single idempotent provisioning operation
///
/// `detect` must never change the host. `mutate` is only called after
/// `detect` returned [`Detection::Absent`] and must issue its steps in
/// their fixed order.
pub trait Action: fmt::Debug {
    /// Stable identifier (e.g. "nginx", "sysctl")
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> String;

    /// Check whether the end-state already holds
    fn detect(&self, run: &Run<'_>) -> Result<Detection>;

    /// Reach the end-state
    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()>;
}

/// A boxed action for registration tables
pub type BoxedAction = Box<dyn Action>;

/// Mutation recorder bound to a run
///
/// Hard-required steps return `Err` on failure, which `?` turns into an
/// aborted action. Best-effort failures are recorded and the action
/// carries on.
pub struct Steps<'s, 'a> {
    run: &'s Run<'a>,
    failures: Vec<String>,
    notes: Vec<String>,
}

impl<'s, 'a> Steps<'s, 'a> {
    pub fn new(run: &'s Run<'a>) -> Self {
        Self {
            run,
            failures: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn run(&self) -> &'s Run<'a> {
        self.run
    }

    /// Host facts, probed on first use
    pub fn facts(&self) -> Result<&'s HostFacts> {
        self.run.facts()
    }

    /// Read-only probe issued in the middle of a mutation
    pub fn probe(&self, command: &str) -> Result<CommandResult> {
        self.run.probe(command)
    }

    /// Elevated step that must succeed
    pub fn required(&mut self, command: &str) -> Result<CommandResult> {
        self.run.executor().run(command, true, false)
    }

    /// Elevated step whose failure is logged and tolerated
    pub fn best_effort(&mut self, command: &str) -> Result<CommandResult> {
        let result = self.run.executor().run(command, true, true)?;
        self.record(command, &result);
        Ok(result)
    }

    /// Unprivileged step that must succeed
    pub fn user(&mut self, command: &str) -> Result<CommandResult> {
        self.run.executor().run(command, false, false)
    }

    /// Unprivileged step whose failure is logged and tolerated
    pub fn user_best_effort(&mut self, command: &str) -> Result<CommandResult> {
        let result = self.run.executor().run(command, false, true)?;
        self.record(command, &result);
        Ok(result)
    }

    /// Unprivileged step that has a fallback: failure is neither fatal nor
    /// counted against the action
    pub fn attempt(&mut self, command: &str) -> Result<CommandResult> {
        self.run.executor().run(command, false, true)
    }

    /// Fail when a file to upload is missing locally
    ///
    /// Actions call this before their first step so a missing payload
    /// aborts them without touching the host.
    pub fn require_payload(&self, local: &Path) -> Result<()> {
        if local.is_file() {
            Ok(())
        } else {
            Err(Error::Payload {
                path: local.to_path_buf(),
            })
        }
    }

    /// Install a local payload file on the host (elevated)
    pub fn put(&mut self, local: &Path, remote: &str) -> Result<()> {
        self.require_payload(local)?;
        self.run.executor().put(local, remote, true)
    }

    /// Append only the lines not already present in `path`
    ///
    /// Returns how many lines were appended.
    pub fn ensure_lines<S: AsRef<str>>(&mut self, path: &str, lines: &[S]) -> Result<usize> {
        let missing = self.run.missing_lines(path, lines)?;
        if missing.is_empty() {
            return Ok(0);
        }
        self.required(&shell::append_lines(path, &missing))?;
        Ok(missing.len())
    }

    /// Informational output for the operator
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        self.notes.push(message);
    }

    fn record(&mut self, command: &str, result: &CommandResult) {
        if result.failed() {
            let output = result.diagnostic();
            log::warn!("best-effort step failed: {command}: {output}");
            let failure = if output.is_empty() {
                command.to_string()
            } else {
                format!("{command}: {output}")
            };
            self.failures.push(failure);
        }
    }
}

/// Run one action through detection and, if needed, mutation
///
/// Errors never escape: a failed probe or hard-required step ends the
/// action as [`Outcome::Aborted`].
pub fn apply(action: &dyn Action, run: &Run<'_>, reporter: &mut dyn Reporter) -> Outcome {
    let name = action.name();
    let mut state = ActionState::NotStarted;

    reporter.on_action_start(name, &action.description());
    advance(name, &mut state, ActionState::Detecting);

    let outcome = match action.detect(run) {
        Err(e) => Outcome::Aborted {
            error: e.to_string(),
        },
        Ok(Detection::Satisfied { details }) => Outcome::AlreadySatisfied { details },
        Ok(Detection::Unsupported { reason }) => Outcome::Unsupported { reason },
        Ok(Detection::Absent) if run.is_dry_run() => Outcome::Skipped {
            reason: "dry run, would apply".to_string(),
        },
        Ok(Detection::Absent) => {
            advance(name, &mut state, ActionState::Mutating);
            let mut steps = Steps::new(run);
            let result = action.mutate(&mut steps);

            for note in &steps.notes {
                reporter.on_note(name, note);
            }

            match result {
                Err(e) => Outcome::Aborted {
                    error: e.to_string(),
                },
                Ok(()) if steps.failures.is_empty() => Outcome::Done,
                Ok(()) => Outcome::PartiallyFailed {
                    failures: steps.failures,
                },
            }
        }
    };

    advance(name, &mut state, ActionState::Finished(outcome.clone()));
    reporter.on_action_complete(name, &outcome);
    outcome
}

fn advance(name: &str, state: &mut ActionState, next: ActionState) {
    debug_assert!(
        state.can_transition_to(&next),
        "illegal transition {state:?} -> {next:?}"
    );
    log::debug!("{name}: {state:?} -> {next:?}");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{NoReport, Recording};
    use crate::sim::{SimHost, idempotence_check};
    use crate::types::CommandResult;
    use pretty_assertions::assert_eq;

    const LIMITS: &str = "/etc/example.conf";

    /// Appends a line and reloads, with a best-effort extra step
    #[derive(Debug)]
    struct TuneLine {
        line: &'static str,
    }

    impl Action for TuneLine {
        fn name(&self) -> &'static str {
            "tune-line"
        }

        fn description(&self) -> String {
            format!("Ensure `{}`", self.line)
        }

        fn detect(&self, run: &Run<'_>) -> Result<Detection> {
            Ok(Detection::from_probe(run.has_line(LIMITS, self.line)?, "present"))
        }

        fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
            steps.ensure_lines(LIMITS, &[self.line])?;
            steps.best_effort("service example reload")?;
            steps.note("reloaded");
            Ok(())
        }
    }

    /// Adds a repository then installs from it
    #[derive(Debug)]
    struct RepoInstall;

    impl Action for RepoInstall {
        fn name(&self) -> &'static str {
            "repo-install"
        }

        fn description(&self) -> String {
            "Install from a third-party repository".into()
        }

        fn detect(&self, run: &Run<'_>) -> Result<Detection> {
            Ok(Detection::from_probe(run.has_binary("thing")?, ""))
        }

        fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
            steps.required("add-apt-repository -y ppa:thing/stable")?;
            steps.required(&shell::apt_update_install(&["thing"]))?;
            Ok(())
        }
    }

    #[test]
    fn test_apply_then_reapply_is_noop() {
        let host = SimHost::ubuntu("18.04", "bionic");
        let action = TuneLine {
            line: "net.core.somaxconn = 65535",
        };

        let check = idempotence_check(&action, &host);
        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(check.second_calls, check.detection_calls);
        assert_eq!(
            host.file_lines(LIMITS),
            Some(vec!["net.core.somaxconn = 65535".to_string()])
        );
    }

    #[test]
    fn test_hard_required_failure_stops_later_steps() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.script(
            "add-apt-repository",
            CommandResult::failed_with("cannot add PPA"),
        );
        let run = Run::new(&host);

        let outcome = apply(&RepoInstall, &run, &mut NoReport);

        assert!(matches!(outcome, Outcome::Aborted { .. }));
        assert_eq!(host.count_matching("apt-get install"), 0);
    }

    #[test]
    fn test_best_effort_failure_is_partial() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.script("service example reload", CommandResult::failed_with("no such service"));
        let run = Run::new(&host);
        let mut recording = Recording::default();

        let outcome = apply(&TuneLine { line: "x = 1" }, &run, &mut recording);

        match outcome {
            Outcome::PartiallyFailed { failures } => {
                assert_eq!(failures, vec!["service example reload: no such service"]);
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        assert_eq!(recording.notes(), vec!["reloaded"]);
        assert_eq!(host.file_lines(LIMITS), Some(vec!["x = 1".to_string()]));
    }

    #[test]
    fn test_dry_run_stops_after_detection() {
        let host = SimHost::ubuntu("18.04", "bionic");
        let run = Run::new(&host).with_dry_run(true);

        let outcome = apply(&RepoInstall, &run, &mut NoReport);

        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(host.elevated_calls().is_empty());
    }

    #[test]
    fn test_failed_probe_aborts() {
        #[derive(Debug)]
        struct NeedsKernel;

        impl Action for NeedsKernel {
            fn name(&self) -> &'static str {
                "needs-kernel"
            }
            fn description(&self) -> String {
                String::new()
            }
            fn detect(&self, run: &Run<'_>) -> Result<Detection> {
                run.executor().run("uname -r", false, false)?;
                Ok(Detection::Absent)
            }
            fn mutate(&self, _steps: &mut Steps<'_, '_>) -> Result<()> {
                unreachable!("detection fails first")
            }
        }

        let host = SimHost::ubuntu("18.04", "bionic");
        host.script("uname -r", CommandResult::failed_with(""));
        let outcome = apply(&NeedsKernel, &Run::new(&host), &mut NoReport);
        assert!(matches!(outcome, Outcome::Aborted { .. }));
    }

    #[test]
    fn test_missing_payload_aborts_before_upload() {
        let host = SimHost::ubuntu("18.04", "bionic");
        let run = Run::new(&host);
        let mut steps = Steps::new(&run);
        let err = steps
            .put(Path::new("/definitely/not/here.conf"), "/etc/nginx/conf.d/")
            .unwrap_err();
        assert!(matches!(err, Error::Payload { .. }));
        assert!(host.uploads().is_empty());
    }

    #[test]
    fn test_ensure_lines_never_duplicates() {
        let host = SimHost::ubuntu("18.04", "bionic");
        let run = Run::new(&host);
        let mut steps = Steps::new(&run);

        let first = steps.ensure_lines(LIMITS, &["a = 1", "b = 2"]).unwrap();
        let second = steps.ensure_lines(LIMITS, &["b = 2", "c = 3", "a = 1"]).unwrap();
        let third = steps.ensure_lines(LIMITS, &["c = 3"]).unwrap();

        assert_eq!((first, second, third), (2, 1, 0));
        assert_eq!(
            host.file_lines(LIMITS),
            Some(vec!["a = 1".to_string(), "b = 2".to_string(), "c = 3".to_string()])
        );
        assert_eq!(host.count_matching("tee -a"), 2);
    }

    #[test]
    fn test_best_effort_failure_prefers_stderr() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.script(
            "service example reload",
            CommandResult::failed_with("Job for example.service failed\n").with_stdout("Reloading\n"),
        );
        let run = Run::new(&host);
        let mut steps = Steps::new(&run);

        steps.best_effort("service example reload").unwrap();

        assert_eq!(
            steps.failures,
            vec!["service example reload: Job for example.service failed"]
        );
    }

    #[test]
    fn test_reporter_sees_lifecycle() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_binary("thing");
        let mut recording = Recording::default();

        apply(&RepoInstall, &Run::new(&host), &mut recording);

        assert_eq!(
            recording.events,
            vec![
                crate::reporter::Event::Started("repo-install".into()),
                crate::reporter::Event::Completed(
                    "repo-install".into(),
                    Outcome::AlreadySatisfied {
                        details: String::new()
                    }
                ),
            ]
        );
    }
}
