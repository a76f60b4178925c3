//! Feedback sink for generation progress and diagnostics
//!
//! Every core operation reports through a [`Feedback`] sink instead of
//! returning hard errors; a run succeeds exactly when no error-severity
//! event was emitted. This keeps generation best-effort: one bad
//! template never aborts its siblings.

use std::cell::{Cell, RefCell};
use std::fmt;

/// Severity of a feedback event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Plain progress output
    Message,
    Info,
    Warning,
    Error,
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Message => "message",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Debug => "debug",
        };
        write!(f, "{}", name)
    }
}

/// Sink for `(severity, message)` events emitted during a run
///
/// Implementations must track whether any [`Severity::Error`] event was
/// seen; the orchestrator reads that flag to decide the run's outcome.
pub trait Feedback {
    fn emit(&self, severity: Severity, message: &str);

    /// Whether any error-severity event has been emitted so far
    fn had_error(&self) -> bool;

    fn message(&self, message: &str) {
        self.emit(Severity::Message, message);
    }

    fn info(&self, message: &str) {
        self.emit(Severity::Info, message);
    }

    fn warning(&self, message: &str) {
        self.emit(Severity::Warning, message);
    }

    fn error(&self, message: &str) {
        self.emit(Severity::Error, message);
    }

    fn debug(&self, message: &str) {
        self.emit(Severity::Debug, message);
    }
}

/// Feedback sink that records every event in memory
///
/// Used by tests and by callers that want to inspect diagnostics after
/// the run instead of streaming them to a console.
#[derive(Debug, Default)]
pub struct CollectingFeedback {
    events: RefCell<Vec<(Severity, String)>>,
    saw_error: Cell<bool>,
}

impl CollectingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events emitted so far, in order
    pub fn events(&self) -> Vec<(Severity, String)> {
        self.events.borrow().clone()
    }

    /// Events of one severity
    pub fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl Feedback for CollectingFeedback {
    fn emit(&self, severity: Severity, message: &str) {
        if severity == Severity::Error {
            self.saw_error.set(true);
        }
        self.events.borrow_mut().push((severity, message.to_string()));
    }

    fn had_error(&self) -> bool {
        self.saw_error.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_flag_tracks_error_events() {
        let feedback = CollectingFeedback::new();
        feedback.info("starting");
        feedback.warning("odd but fine");
        assert!(!feedback.had_error());

        feedback.error("missing template");
        assert!(feedback.had_error());
        assert_eq!(feedback.events().len(), 3);
    }

    #[test]
    fn test_with_severity_filters() {
        let feedback = CollectingFeedback::new();
        feedback.info("a");
        feedback.error("b");
        feedback.info("c");
        assert_eq!(feedback.with_severity(Severity::Info), vec!["a", "c"]);
        assert_eq!(feedback.with_severity(Severity::Error), vec!["b"]);
    }
}
