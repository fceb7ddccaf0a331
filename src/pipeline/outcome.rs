use super::phase::Phase;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a successful run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    /// The requested image does not exist; nothing was done
    ImageNotFound { image: String },

    /// The container produced no observation data; no image was built
    NoDataCollected {
        image_id: String,
        /// Reconstructed instructions of the fat image, shown as guidance
        instructions: Vec<String>,
    },

    /// A minimized image was built
    Built { repo_name: String, has_data: bool },
}

impl BuildOutcome {
    pub fn image_built(&self) -> bool {
        matches!(self, BuildOutcome::Built { .. })
    }
}

/// A recoverable phase failure that was logged and skipped past
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseWarning {
    pub phase: Phase,
    pub message: String,
}

impl PhaseWarning {
    pub fn new(phase: Phase, error: &anyhow::Error) -> Self {
        Self {
            phase,
            message: format!("{:#}", error),
        }
    }
}

/// Result of a run that did not hit a fatal failure
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub image: String,
    pub outcome: BuildOutcome,
    /// Phases in the order they executed
    pub phases: Vec<Phase>,
    pub warnings: Vec<PhaseWarning>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}
