//! Task dispatch: selectors → registered actions → outcomes

use crate::action::{BoxedAction, apply};
use crate::reporter::Reporter;
use crate::run::Run;
use crate::types::{Outcome, RunSummary};

/// A static registration table of tasks
pub trait Catalog {
    /// Actions registered under `name` (exact match), or `None`
    fn resolve(&self, name: &str) -> Option<Vec<BoxedAction>>;

    /// The fixed, ordered "fresh setup" sequence
    fn default_sequence(&self) -> Vec<BoxedAction>;

    /// Every selectable task name
    fn names(&self) -> Vec<&'static str>;
}

/// Options for dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Stop the run at the first aborted action instead of moving on
    pub fail_fast: bool,
}

/// What a dispatch did
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Every action that ran, in order, with its outcome
    pub executed: Vec<(String, Outcome)>,
    /// Selectors that named no task
    pub unknown: Vec<String>,
    pub summary: RunSummary,
    /// Set when `fail_fast` stopped the run at this action
    pub halted_at: Option<String>,
}

impl DispatchReport {
    /// Names of executed actions, in order
    pub fn executed_names(&self) -> Vec<&str> {
        self.executed.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn record(&mut self, name: &str, outcome: Outcome) {
        self.summary.add(&outcome);
        self.executed.push((name.to_string(), outcome));
    }
}

/// Flatten selectors, splitting comma-separated lists and dropping blanks
pub fn split_selectors<S: AsRef<str>>(selectors: &[S]) -> Vec<String> {
    selectors
        .iter()
        .flat_map(|s| s.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run the default sequence (no selectors) or each selected task in order
///
/// An unknown selector is reported and skipped. Each resolved action runs
/// to completion before the next selector is looked at.
pub fn dispatch<C, S>(
    catalog: &C,
    run: &Run<'_>,
    selectors: &[S],
    opts: &DispatchOptions,
    reporter: &mut dyn Reporter,
) -> DispatchReport
where
    C: Catalog + ?Sized,
    S: AsRef<str>,
{
    let mut report = DispatchReport::default();
    let selectors = split_selectors(selectors);

    if selectors.is_empty() {
        log::info!("no tasks selected, running default sequence");
        run_actions(&catalog.default_sequence(), run, opts, reporter, &mut report);
        return report;
    }

    for selector in &selectors {
        if report.halted_at.is_some() {
            break;
        }
        match catalog.resolve(selector) {
            Some(actions) => run_actions(&actions, run, opts, reporter, &mut report),
            None => {
                log::warn!("no such task: {selector}");
                reporter.on_unknown_task(selector);
                report.unknown.push(selector.clone());
                report.summary.unknown_tasks += 1;
            }
        }
    }

    report
}

fn run_actions(
    actions: &[BoxedAction],
    run: &Run<'_>,
    opts: &DispatchOptions,
    reporter: &mut dyn Reporter,
    report: &mut DispatchReport,
) {
    for action in actions {
        let outcome = apply(action.as_ref(), run, reporter);
        let aborted = matches!(outcome, Outcome::Aborted { .. });
        report.record(action.name(), outcome);

        if aborted && opts.fail_fast {
            report.halted_at = Some(action.name().to_string());
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, Detection, Steps};
    use crate::error::Result;
    use crate::reporter::Recording;
    use crate::sim::SimHost;
    use crate::types::CommandResult;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Marker(&'static str);

    impl Action for Marker {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> String {
            format!("Create marker for {}", self.0)
        }

        fn detect(&self, run: &Run<'_>) -> Result<Detection> {
            Ok(Detection::from_probe(run.has_file(&path(self.0))?, ""))
        }

        fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
            steps.required(&format!("install-{}", self.0))?;
            steps.required(&crate::shell::touch(&path(self.0)))?;
            Ok(())
        }
    }

    fn path(name: &str) -> String {
        format!("/var/lib/test/{name}")
    }

    struct Toy;

    impl Catalog for Toy {
        fn resolve(&self, name: &str) -> Option<Vec<BoxedAction>> {
            match name {
                "a" => Some(vec![Box::new(Marker("a"))]),
                "b" => Some(vec![Box::new(Marker("b"))]),
                "pair" => Some(vec![Box::new(Marker("c")), Box::new(Marker("d"))]),
                _ => None,
            }
        }

        fn default_sequence(&self) -> Vec<BoxedAction> {
            vec![Box::new(Marker("base")), Box::new(Marker("env"))]
        }

        fn names(&self) -> Vec<&'static str> {
            vec!["a", "b", "pair"]
        }
    }

    fn dispatch_on(host: &SimHost, selectors: &[&str], recording: &mut Recording) -> DispatchReport {
        let run = Run::new(host);
        dispatch(&Toy, &run, selectors, &DispatchOptions::default(), recording)
    }

    #[test]
    fn test_unknown_selector_does_not_stop_others() {
        for selectors in [["a", "bogus", "b"], ["bogus", "a", "b"], ["a", "b", "bogus"]] {
            let host = SimHost::new();
            let mut recording = Recording::default();

            let report = dispatch_on(&host, &selectors, &mut recording);

            assert_eq!(report.executed_names(), vec!["a", "b"]);
            assert_eq!(report.unknown, vec!["bogus"]);
            assert_eq!(recording.unknown(), vec!["bogus"]);
            assert_eq!(report.summary.unknown_tasks, 1);
        }
    }

    #[test]
    fn test_default_sequence_in_order_and_nothing_else() {
        let host = SimHost::new();
        let mut recording = Recording::default();

        let report = dispatch_on(&host, &[], &mut recording);

        assert_eq!(report.executed_names(), vec!["base", "env"]);
        assert_eq!(recording.completed(), vec!["base", "env"]);
        assert_eq!(host.count_matching("install-a"), 0);
        assert_eq!(host.count_matching("install-b"), 0);
        let installs: Vec<String> = host
            .calls()
            .into_iter()
            .filter(|c| c.command.starts_with("install-"))
            .map(|c| c.command)
            .collect();
        assert_eq!(installs, vec!["install-base", "install-env"]);
    }

    #[test]
    fn test_comma_separated_selectors() {
        assert_eq!(
            split_selectors(&["a,b", " pair ", "", ","]),
            vec!["a", "b", "pair"]
        );

        let host = SimHost::new();
        let report = dispatch_on(&host, &["pair,a"], &mut Recording::default());
        assert_eq!(report.executed_names(), vec!["c", "d", "a"]);
    }

    #[test]
    fn test_blank_selectors_run_default_sequence() {
        let host = SimHost::new();
        let report = dispatch_on(&host, &[" , "], &mut Recording::default());
        assert_eq!(report.executed_names(), vec!["base", "env"]);
    }

    #[test]
    fn test_abort_continues_without_fail_fast() {
        let host = SimHost::new();
        host.script("install-a", CommandResult::failed_with("broken"));

        let report = dispatch_on(&host, &["a", "b"], &mut Recording::default());

        assert_eq!(report.executed_names(), vec!["a", "b"]);
        assert_eq!(report.summary.aborted, 1);
        assert_eq!(report.summary.done, 1);
        assert!(report.halted_at.is_none());
    }

    #[test]
    fn test_fail_fast_halts() {
        let host = SimHost::new();
        host.script("install-a", CommandResult::failed_with("broken"));
        let run = Run::new(&host);
        let opts = DispatchOptions { fail_fast: true };

        let report = dispatch(&Toy, &run, &["a", "b"], &opts, &mut Recording::default());

        assert_eq!(report.executed_names(), vec!["a"]);
        assert_eq!(report.halted_at.as_deref(), Some("a"));
        assert_eq!(host.count_matching("install-b"), 0);
    }

    #[test]
    fn test_second_dispatch_is_noop() {
        let host = SimHost::new();
        dispatch_on(&host, &["a"], &mut Recording::default());
        let before = host.call_count();

        let report = dispatch_on(&host, &["a"], &mut Recording::default());

        assert_eq!(report.summary.already, 1);
        assert!(host.elevated_calls_since(before).is_empty());
    }
}
