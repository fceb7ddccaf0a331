//! Build pipeline: the phase table, its driver and the state passed between phases

pub mod completion;
pub mod continue_after;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod phase;
pub mod request;
pub mod session;
pub mod storage;

pub use completion::{completion, Completion, CompletionSignal};
pub use continue_after::{ArmedWait, ContinueAfter};
pub use error::BuildError;
pub use orchestrator::BuildOrchestrator;
pub use outcome::{BuildOutcome, BuildReport, PhaseWarning};
pub use phase::{Phase, PhaseDescriptor, Severity, PHASES};
pub use request::{
    BuildRequest, ContainerOverrides, DockerClientConfig, HttpProbeCmd, ImageOverrides,
    ParseError, VolumeMount,
};
pub use session::BuildSession;
pub use storage::{prepare_run_dirs, remove_artifacts, RunDirs};
