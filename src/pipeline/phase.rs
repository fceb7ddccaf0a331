//! Phase table for the build pipeline
//!
//! Phases run strictly in the order of [`PHASES`]. Each descriptor carries the
//! severity applied when the phase fails, so the fatal/recoverable split lives
//! in one table instead of at every call site.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Connect,
    Resolve,
    Inspect,
    PrepareStorage,
    ProcessImageData,
    LaunchContainer,
    ArmContinueAfter,
    Wait,
    FinishMonitoring,
    ShutdownContainer,
    DataPresenceGate,
    ProcessContainerData,
    ResolveTargetTag,
    Build,
    Cleanup,
    Report,
}

/// What a phase failure does to the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Abort the run; no later phase executes
    Fatal,
    /// Log a warning and go on with the next phase
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseDescriptor {
    pub phase: Phase,
    pub severity: Severity,
}

const fn fatal(phase: Phase) -> PhaseDescriptor {
    PhaseDescriptor {
        phase,
        severity: Severity::Fatal,
    }
}

const fn warn(phase: Phase) -> PhaseDescriptor {
    PhaseDescriptor {
        phase,
        severity: Severity::Warn,
    }
}

pub const PHASES: [PhaseDescriptor; 16] = [
    fatal(Phase::Connect),
    fatal(Phase::Resolve),
    fatal(Phase::Inspect),
    fatal(Phase::PrepareStorage),
    fatal(Phase::ProcessImageData),
    fatal(Phase::LaunchContainer),
    fatal(Phase::ArmContinueAfter),
    fatal(Phase::Wait),
    warn(Phase::FinishMonitoring),
    warn(Phase::ShutdownContainer),
    fatal(Phase::DataPresenceGate),
    fatal(Phase::ProcessContainerData),
    fatal(Phase::ResolveTargetTag),
    fatal(Phase::Build),
    warn(Phase::Cleanup),
    fatal(Phase::Report),
];

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Connect => "connect",
            Phase::Resolve => "resolve",
            Phase::Inspect => "inspect",
            Phase::PrepareStorage => "prepare_storage",
            Phase::ProcessImageData => "process_image_data",
            Phase::LaunchContainer => "launch_container",
            Phase::ArmContinueAfter => "arm_continue_after",
            Phase::Wait => "wait",
            Phase::FinishMonitoring => "finish_monitoring",
            Phase::ShutdownContainer => "shutdown_container",
            Phase::DataPresenceGate => "data_presence_gate",
            Phase::ProcessContainerData => "process_container_data",
            Phase::ResolveTargetTag => "resolve_target_tag",
            Phase::Build => "build",
            Phase::Cleanup => "cleanup",
            Phase::Report => "report",
        }
    }

    pub fn severity(&self) -> Severity {
        PHASES
            .iter()
            .find(|d| d.phase == *self)
            .map(|d| d.severity)
            .unwrap_or(Severity::Fatal)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
