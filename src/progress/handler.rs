//! Progress handler trait and events

use crate::pipeline::Phase;
use std::time::Duration;

/// Events emitted while a build runs
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Run started
    Started { image: String },

    /// A phase is about to execute
    PhaseStarted { phase: Phase },

    /// A phase finished without error
    PhaseComplete { phase: Phase, duration: Duration },

    /// A recoverable phase failed; the run goes on
    PhaseWarning { phase: Phase, error: String },

    /// The observation wait is armed and about to block
    WaitStarted { mode: &'static str },

    /// Run finished with a terminal outcome
    Completed { outcome: String, total_time: Duration },

    /// A fatal phase failed
    Failed { phase: Phase, error: String },
}

/// Trait for handling progress events during a build
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}
