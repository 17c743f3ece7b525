//! Progress reporting for dispatch and action runs
//!
//! The library never prints. Callers implement [`Reporter`] to render
//! status lines however they like.

use crate::types::Outcome;

/// Receives progress events while a run executes
pub trait Reporter {
    /// Called before an action starts detecting
    fn on_action_start(&mut self, name: &str, description: &str);

    /// Informational output produced by an action's mutation
    fn on_note(&mut self, name: &str, note: &str);

    /// Called once an action reaches a terminal state
    fn on_action_complete(&mut self, name: &str, outcome: &Outcome);

    /// Called for a selector that names no registered task
    fn on_unknown_task(&mut self, selector: &str);
}

/// No-op reporter
pub struct NoReport;

impl Reporter for NoReport {
    fn on_action_start(&mut self, _name: &str, _description: &str) {}
    fn on_note(&mut self, _name: &str, _note: &str) {}
    fn on_action_complete(&mut self, _name: &str, _outcome: &Outcome) {}
    fn on_unknown_task(&mut self, _selector: &str) {}
}

/// One recorded progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Note(String, String),
    Completed(String, Outcome),
    UnknownTask(String),
}

/// Reporter that keeps every event, in order
#[derive(Debug, Default)]
pub struct Recording {
    pub events: Vec<Event>,
}

impl Recording {
    /// Names of actions that completed, in order
    pub fn completed(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Completed(name, _) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Selectors reported as unknown
    pub fn unknown(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::UnknownTask(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn notes(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Note(_, note) => Some(note.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for Recording {
    fn on_action_start(&mut self, name: &str, _description: &str) {
        self.events.push(Event::Started(name.to_string()));
    }

    fn on_note(&mut self, name: &str, note: &str) {
        self.events
            .push(Event::Note(name.to_string(), note.to_string()));
    }

    fn on_action_complete(&mut self, name: &str, outcome: &Outcome) {
        self.events
            .push(Event::Completed(name.to_string(), outcome.clone()));
    }

    fn on_unknown_task(&mut self, selector: &str) {
        self.events.push(Event::UnknownTask(selector.to_string()));
    }
}
