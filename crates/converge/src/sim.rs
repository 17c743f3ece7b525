//! In-memory host model for tests
//!
//! [`SimHost`] implements [`Executor`] by interpreting the command shapes
//! built in [`crate::shell`] against a small model of files, directories
//! and binaries. Anything else succeeds with empty output unless a script
//! says otherwise.

use crate::action::{Action, Detection};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::facts::{LIB64_DIR, PROBE_CODENAME, PROBE_DISTRIBUTION, PROBE_RELEASE};
use crate::reporter::NoReport;
use crate::run::Run;
use crate::shell;
use crate::types::{CommandResult, Outcome};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One command the host received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub command: String,
    pub elevate: bool,
    pub tolerate: bool,
}

/// State change applied when a matching command succeeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The binary shows up on PATH
    ProvidesBinary(String),
    /// The file exists afterwards (empty if new)
    CreatesFile(String),
    /// The directory exists afterwards
    CreatesDir(String),
    /// Commands containing `pattern` are answered with `result` from now on
    Answers {
        pattern: String,
        result: CommandResult,
    },
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, Vec<String>>,
    dirs: BTreeSet<String>,
    binaries: BTreeSet<String>,
    scripts: Vec<(String, CommandResult)>,
    effects: Vec<(String, Effect)>,
    calls: Vec<Call>,
    uploads: Vec<(String, String)>,
}

/// A simulated target host
#[derive(Debug, Default)]
pub struct SimHost {
    state: RefCell<State>,
}

impl SimHost {
    /// A blank host: no files, no binaries, facts probes answer nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// A 64-bit Ubuntu host
    pub fn ubuntu(release: &str, codename: &str) -> Self {
        Self::distribution("ubuntu", release, codename)
    }

    /// A 64-bit Debian host
    pub fn debian(release: &str, codename: &str) -> Self {
        Self::distribution("debian", release, codename)
    }

    fn distribution(id: &str, release: &str, codename: &str) -> Self {
        let host = Self::new();
        host.script(PROBE_RELEASE, CommandResult::ok(format!("{release}\n")));
        host.script(PROBE_CODENAME, CommandResult::ok(format!("{codename}\n")));
        host.script(PROBE_DISTRIBUTION, CommandResult::ok(format!("{id}\n")));
        host.add_dir(LIB64_DIR);
        host
    }

    /// Answer any command containing `pattern` with `result`
    ///
    /// Later scripts win over earlier ones.
    pub fn script(&self, pattern: &str, result: CommandResult) {
        self.state
            .borrow_mut()
            .scripts
            .push((pattern.to_string(), result));
    }

    /// Apply `effect` whenever a command containing `pattern` succeeds
    pub fn effect(&self, pattern: &str, effect: Effect) {
        self.state
            .borrow_mut()
            .effects
            .push((pattern.to_string(), effect));
    }

    pub fn add_binary(&self, name: &str) {
        self.state.borrow_mut().binaries.insert(name.to_string());
    }

    pub fn add_file(&self, path: &str, lines: &[&str]) {
        self.state.borrow_mut().files.insert(
            path.to_string(),
            lines.iter().map(|l| (*l).to_string()).collect(),
        );
    }

    pub fn add_dir(&self, path: &str) {
        self.state.borrow_mut().dirs.insert(path.to_string());
    }

    /// Drop a directory (e.g. `/lib64` to model a 32-bit host)
    pub fn remove_dir(&self, path: &str) {
        self.state.borrow_mut().dirs.remove(path);
    }

    pub fn has_binary(&self, name: &str) -> bool {
        self.state.borrow().binaries.contains(name)
    }

    /// Every command received, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.borrow().calls.len()
    }

    /// Commands received after the first `n`
    pub fn calls_since(&self, n: usize) -> Vec<Call> {
        self.state.borrow().calls.iter().skip(n).cloned().collect()
    }

    /// How many commands contained `needle`
    pub fn count_matching(&self, needle: &str) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.command.contains(needle))
            .count()
    }

    /// Commands run with privileges
    pub fn elevated_calls(&self) -> Vec<Call> {
        self.elevated_calls_since(0)
    }

    pub fn elevated_calls_since(&self, n: usize) -> Vec<Call> {
        self.calls_since(n).into_iter().filter(|c| c.elevate).collect()
    }

    pub fn file_lines(&self, path: &str) -> Option<Vec<String>> {
        self.state.borrow().files.get(path).cloned()
    }

    /// `(local, remote)` pairs of every upload
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.state.borrow().uploads.clone()
    }

    fn evaluate(&self, command: &str) -> CommandResult {
        let scripted = self
            .state
            .borrow()
            .scripts
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, result)| result.clone());

        let result = match scripted {
            Some(result) => result,
            None => self.interpret(command),
        };

        if result.succeeded {
            self.apply_effects(command);
        }
        result
    }

    fn interpret(&self, command: &str) -> CommandResult {
        let mut combined = CommandResult::ok("");
        for segment in command.split(" && ") {
            let result = self.interpret_one(segment.trim());
            combined.stdout.push_str(&result.stdout);
            combined.stderr.push_str(&result.stderr);
            if result.failed() {
                combined.succeeded = false;
                break;
            }
        }
        combined
    }

    fn interpret_one(&self, segment: &str) -> CommandResult {
        let words = shell::split(segment);
        let words: Vec<&str> = words.iter().map(String::as_str).collect();
        let mut state = self.state.borrow_mut();

        let holds = |ok: bool| {
            if ok {
                CommandResult::ok("")
            } else {
                CommandResult::failed_with("")
            }
        };

        if let Some(pipe) = words.iter().position(|w| *w == "|") {
            if words.first() == Some(&"printf") && words.get(pipe + 1) == Some(&"tee") {
                let lines = words.get(2..pipe).unwrap_or(&[]).iter().map(|l| (*l).to_string());
                let append = words.get(pipe + 2) == Some(&"-a");
                let path_at = if append { pipe + 3 } else { pipe + 2 };
                if let Some(path) = words.get(path_at) {
                    let file = state.files.entry((*path).to_string()).or_default();
                    if !append {
                        file.clear();
                    }
                    file.extend(lines);
                }
            }
            return CommandResult::ok("");
        }

        match words.as_slice() {
            ["which", bin] => {
                if state.binaries.contains(*bin) {
                    CommandResult::ok(format!("/usr/bin/{bin}\n"))
                } else {
                    CommandResult::failed_with("")
                }
            }
            ["test", "-f", path] => holds(state.files.contains_key(*path)),
            ["test", "-d", path] => holds(state.dirs.contains(*path)),
            ["test", "-s", path] => holds(state.files.get(*path).is_some_and(|l| !l.is_empty())),
            ["test", "-x", path] => {
                let name = path.rsplit('/').next().unwrap_or(*path);
                holds(state.files.contains_key(*path) || state.binaries.contains(name))
            }
            ["grep", "-qxF", "--", line, path] => holds(
                state
                    .files
                    .get(*path)
                    .is_some_and(|lines| lines.iter().any(|l| l == line)),
            ),
            ["touch", path] => {
                state.files.entry((*path).to_string()).or_default();
                CommandResult::ok("")
            }
            ["rm", "-f", path] => {
                state.files.remove(*path);
                CommandResult::ok("")
            }
            ["sed", "-i", expr, path] => match state.files.get_mut(*path) {
                Some(lines) => {
                    sed_in_place(expr, lines);
                    CommandResult::ok("")
                }
                None => CommandResult::failed_with(format!("sed: can't read {path}")),
            },
            ["mkdir", "-p", path] => {
                state.dirs.insert((*path).to_string());
                CommandResult::ok("")
            }
            _ => CommandResult::ok(""),
        }
    }

    fn apply_effects(&self, command: &str) {
        let mut state = self.state.borrow_mut();
        let effects: Vec<Effect> = state
            .effects
            .iter()
            .filter(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, effect)| effect.clone())
            .collect();

        for effect in effects {
            match effect {
                Effect::ProvidesBinary(name) => {
                    state.binaries.insert(name);
                }
                Effect::CreatesFile(path) => {
                    state.files.entry(path).or_default();
                }
                Effect::CreatesDir(path) => {
                    state.dirs.insert(path);
                }
                Effect::Answers { pattern, result } => {
                    state.scripts.push((pattern, result));
                }
            }
        }
    }
}

/// The three `sed -i` forms tasks use: `s/^prefix.*/line/`, `/^prefix/d`
/// and `1i line`
fn sed_in_place(expr: &str, lines: &mut Vec<String>) {
    if let Some(line) = expr.strip_prefix("1i ") {
        lines.insert(0, line.to_string());
    } else if let Some(body) = expr.strip_prefix("s/^").and_then(|b| b.strip_suffix('/')) {
        if let Some((prefix, replacement)) = body.split_once(".*/") {
            for line in lines.iter_mut().filter(|l| l.starts_with(prefix)) {
                *line = replacement.to_string();
            }
        }
    } else if let Some(prefix) = expr.strip_prefix("/^").and_then(|b| b.strip_suffix("/d")) {
        lines.retain(|l| !l.starts_with(prefix));
    }
}

impl Executor for SimHost {
    fn run(&self, command: &str, elevate: bool, tolerate_failure: bool) -> Result<CommandResult> {
        self.state.borrow_mut().calls.push(Call {
            command: command.to_string(),
            elevate,
            tolerate: tolerate_failure,
        });

        let result = self.evaluate(command);
        if result.failed() && !tolerate_failure {
            return Err(Error::CommandFailed {
                command: command.to_string(),
                status: 1,
                output: result.diagnostic().to_string(),
            });
        }
        Ok(result.tolerated(tolerate_failure))
    }

    fn put(&self, local: &Path, remote: &str, elevate: bool) -> Result<()> {
        let local_name = local.display().to_string();
        let target = if remote.ends_with('/') {
            let file_name = local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{remote}{file_name}")
        } else {
            remote.to_string()
        };

        let mut state = self.state.borrow_mut();
        state.calls.push(Call {
            command: format!("put {local_name} {target}"),
            elevate,
            tolerate: false,
        });
        state.uploads.push((local_name, target.clone()));
        state.files.entry(target).or_default();
        Ok(())
    }

    fn describe(&self) -> String {
        "simulated host".to_string()
    }
}

/// Result of applying an action twice and then detecting once more
#[derive(Debug)]
pub struct IdempotenceCheck {
    pub first: Outcome,
    pub second: Outcome,
    /// Commands issued by the second apply
    pub second_calls: Vec<Call>,
    /// Commands issued by a bare detection on the converged host
    pub detection_calls: Vec<Call>,
    pub detection: Option<Detection>,
}

/// Apply `action` twice on `host`, each time in a fresh run
///
/// On a converged host the second apply must issue exactly the commands
/// detection issues, and nothing elevated.
pub fn idempotence_check(action: &dyn Action, host: &SimHost) -> IdempotenceCheck {
    let first = crate::action::apply(action, &Run::new(host), &mut NoReport);

    let before = host.call_count();
    let second = crate::action::apply(action, &Run::new(host), &mut NoReport);
    let second_calls = host.calls_since(before);

    let before = host.call_count();
    let detection = action.detect(&Run::new(host)).ok();
    let detection_calls = host.calls_since(before);

    IdempotenceCheck {
        first,
        second,
        second_calls,
        detection_calls,
        detection,
    }
}
