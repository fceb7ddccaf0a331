use super::phase::Phase;
use thiserror::Error;

/// Errors that end a build run
#[derive(Debug, Error)]
pub enum BuildError {
    /// A fatal phase failed; nothing after it was attempted
    #[error("Phase {phase} failed: {source:#}")]
    PhaseFailed {
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    pub fn phase(&self) -> Phase {
        match self {
            BuildError::PhaseFailed { phase, .. } => *phase,
        }
    }

    /// Returns a user-facing message with a hint for the failed phase
    pub fn help_message(&self) -> String {
        let BuildError::PhaseFailed { phase, source } = self;
        let hint = match phase {
            Phase::Connect => {
                "Help: Cannot reach the Docker daemon. Check that it is running and that \
                 DOCKER_HOST / DOCKER_CERT_PATH point at it."
            }
            Phase::Inspect | Phase::ProcessImageData => {
                "Help: The image could not be inspected. Try 'docker image inspect' on it."
            }
            Phase::PrepareStorage => {
                "Help: The state directory is not writable. Set --state-path or SLIMBOX_STATE_PATH."
            }
            Phase::LaunchContainer => {
                "Help: The instrumented container did not start. Check the overrides and mounts."
            }
            Phase::ArmContinueAfter => {
                "Help: The continue-after mechanism could not be set up. The instrumented \
                 container may still be running."
            }
            Phase::ProcessContainerData => {
                "Help: The collected artifacts could not be processed. Re-run with --debug."
            }
            Phase::Build => "Help: The minimized image could not be built.",
            _ => "Help: Re-run with --verbose for details.",
        };
        format!("Error: {} failed\n\n{}\n\nDetails: {:#}", phase, hint, source)
    }
}
