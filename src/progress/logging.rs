//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, error, info};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { image } => {
                info!(image = %image, "Starting build");
            }
            ProgressEvent::PhaseStarted { phase } => {
                debug!(phase = %phase, "Starting phase");
            }
            ProgressEvent::PhaseComplete { phase, duration } => {
                debug!(
                    phase = %phase,
                    duration_ms = duration.as_millis(),
                    "Phase complete"
                );
            }
            ProgressEvent::PhaseWarning { phase, error } => {
                debug!(phase = %phase, error = %error, "Recorded phase warning");
            }
            ProgressEvent::WaitStarted { mode } => {
                info!(mode, "Watching container monitor");
            }
            ProgressEvent::Completed {
                outcome,
                total_time,
            } => {
                info!(
                    outcome = %outcome,
                    total_time_ms = total_time.as_millis(),
                    "Build complete"
                );
            }
            ProgressEvent::Failed { phase, error } => {
                error!(phase = %phase, error = %error, "Build failed");
            }
        }
    }
}
