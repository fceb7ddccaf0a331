//! Output formatting for build reports
//!
//! # Example
//!
//! ```ignore
//! use slimbox::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! println!("{}", formatter.format_report(&report)?);
//! ```

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pipeline::{BuildOutcome, BuildReport};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// Human-readable formatted text
    Human,
}

/// Tool and daemon versions shown by `slimbox version`
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub slimbox: String,
    pub docker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_error: Option<String>,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &BuildReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize build report to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize build report to YAML")
            }
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    pub fn format_version(&self, version: &VersionInfo) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(version)
                .context("Failed to serialize version info to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(version).context("Failed to serialize version info to YAML")
            }
            OutputFormat::Human => {
                let mut output = format!("slimbox {}\n", version.slimbox);
                match (&version.docker, &version.docker_error) {
                    (Some(docker), _) => output.push_str(&format!("Docker  {}\n", docker)),
                    (None, Some(error)) => {
                        output.push_str(&format!("Docker  (unavailable: {})\n", error))
                    }
                    (None, None) => output.push_str("Docker  (unknown)\n"),
                }
                Ok(output)
            }
        }
    }

    fn format_report_human(&self, report: &BuildReport) -> String {
        let mut output = String::new();

        match &report.outcome {
            BuildOutcome::Built {
                repo_name,
                has_data,
            } => {
                output.push_str("\u{2713} Minified Image Built\n");
                output.push_str(RULE);
                output.push_str("\n\n");
                output.push_str(&format!("Source Image:  {}\n", report.image));
                output.push_str(&format!("New Image:     {}\n", repo_name));
                output.push_str(&format!(
                    "Data:          {}\n",
                    if *has_data {
                        "collected files"
                    } else {
                        "none (configuration only)"
                    }
                ));
            }
            BuildOutcome::ImageNotFound { image } => {
                output.push_str("\u{26A0} Target Image Not Found\n");
                output.push_str(RULE);
                output.push_str("\n\n");
                output.push_str(&format!("Image:  {}\n", image));
                output.push_str("Nothing was built.\n");
            }
            BuildOutcome::NoDataCollected {
                image_id,
                instructions,
            } => {
                output.push_str("\u{26A0} No Data Collected (no minified image generated)\n");
                output.push_str(RULE);
                output.push_str("\n\n");
                output.push_str(&format!("Image:     {}\n", report.image));
                output.push_str(&format!("Image ID:  {}\n", image_id));
                if !instructions.is_empty() {
                    output.push_str("\nFat image Dockerfile instructions:\n");
                    for instruction in instructions {
                        output.push_str(&format!("  {}\n", instruction));
                    }
                }
            }
        }

        if !report.warnings.is_empty() {
            output.push_str("\n\u{26A0} Warnings:\n");
            for warning in &report.warnings {
                output.push_str(&format!("  - {}: {}\n", warning.phase, warning.message));
            }
        }

        output.push_str(&format!(
            "\nPhases: {}\n",
            report
                .phases
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(" \u{2192} ")
        ));
        output.push_str(&format!("Processed in {}ms\n", report.duration_ms));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Phase, PhaseWarning};
    use chrono::Utc;

    fn report(outcome: BuildOutcome) -> BuildReport {
        BuildReport {
            image: "nginx:latest".to_string(),
            outcome,
            phases: vec![Phase::Connect, Phase::Resolve],
            warnings: vec![PhaseWarning {
                phase: Phase::ShutdownContainer,
                message: "container already removed".to_string(),
            }],
            started_at: Utc::now(),
            duration_ms: 42,
        }
    }

    #[test]
    fn test_human_built() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter
            .format_report(&report(BuildOutcome::Built {
                repo_name: "nginx.slim".to_string(),
                has_data: true,
            }))
            .unwrap();

        assert!(output.contains("Minified Image Built"));
        assert!(output.contains("New Image:     nginx.slim"));
        assert!(output.contains("shutdown_container: container already removed"));
        assert!(output.contains("connect \u{2192} resolve"));
        assert!(output.contains("Processed in 42ms"));
    }

    #[test]
    fn test_human_no_data_lists_instructions() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter
            .format_report(&report(BuildOutcome::NoDataCollected {
                image_id: "sha256:abc".to_string(),
                instructions: vec!["CMD [\"nginx\"]".to_string()],
            }))
            .unwrap();

        assert!(output.contains("no minified image generated"));
        assert!(output.contains("  CMD [\"nginx\"]"));
    }

    #[test]
    fn test_json_report() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter
            .format_report(&report(BuildOutcome::ImageNotFound {
                image: "nginx:latest".to_string(),
            }))
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["outcome"]["status"], "image_not_found");
        assert_eq!(value["phases"][1], "resolve");
        assert_eq!(value["warnings"][0]["phase"], "shutdown_container");
        assert_eq!(value["duration_ms"], 42);
    }

    #[test]
    fn test_yaml_report() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter
            .format_report(&report(BuildOutcome::Built {
                repo_name: "nginx.slim".to_string(),
                has_data: false,
            }))
            .unwrap();

        assert!(output.contains("status: built"));
        assert!(output.contains("repo_name: nginx.slim"));
    }

    #[test]
    fn test_version_human() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter
            .format_version(&VersionInfo {
                slimbox: "0.3.0".to_string(),
                docker: None,
                docker_error: Some("connection refused".to_string()),
            })
            .unwrap();
        assert!(output.contains("slimbox 0.3.0"));
        assert!(output.contains("unavailable: connection refused"));
    }
}
