//! Configuration management for slimbox
//!
//! Settings are loaded from environment variables with fallback defaults.
//! Command-line flags override them per run.
//!
//! # Environment Variables
//!
//! - `SLIMBOX_STATE_PATH`: Root for per-image run directories - default: the
//!   platform data dir + `slimbox/state`
//! - `DOCKER_HOST`: Daemon endpoint (`unix://`, `tcp://`, `http://`, `https://`)
//! - `DOCKER_TLS_VERIFY`: Use TLS for TCP endpoints when set to a non-empty, non-"0" value
//! - `DOCKER_CERT_PATH`: Directory holding `key.pem`, `cert.pem` and `ca.pem`
//! - `SLIMBOX_DOCKER_TIMEOUT`: Daemon request timeout in seconds - default: "120"
//! - `SLIMBOX_CONTINUE_AFTER_TIMEOUT`: Seconds for `--continue-after timeout` - default: "60"
//! - `SLIMBOX_LOG_LEVEL`: Logging level - default: "info"
//!
//! # Example
//!
//! ```no_run
//! use slimbox::SlimboxConfig;
//!
//! let config = SlimboxConfig::default();
//! config.validate().expect("Invalid configuration");
//! println!("{}", config);
//! ```

use crate::pipeline::request::{DockerClientConfig, ParseError, DEFAULT_DOCKER_TIMEOUT_SECS};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CONTINUE_AFTER_TIMEOUT_SECS: u64 = 60;
const MAX_DOCKER_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown continue-after mode: {0}. Valid options: enter, signal, timeout, probe")]
    UnknownContinueAfterMode(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    InvalidArgument(#[from] ParseError),
}

#[derive(Debug, Clone)]
pub struct SlimboxConfig {
    pub state_path: PathBuf,

    pub docker_host: Option<String>,

    pub docker_tls_verify: bool,

    pub docker_cert_path: Option<PathBuf>,

    /// Daemon request timeout in seconds
    pub docker_timeout_secs: u64,

    /// Wait used by `--continue-after timeout` when no explicit value is given
    pub continue_after_timeout_secs: u64,

    pub log_level: String,
}

impl Default for SlimboxConfig {
    /// Loads `SLIMBOX_*` and `DOCKER_*` variables, falling back to defaults.
    ///
    /// Unparsable numbers fall back too; `validate` only sees the result.
    fn default() -> Self {
        let state_path = env::var("SLIMBOX_STATE_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_state_path);

        let docker_host = env::var("DOCKER_HOST").ok().filter(|v| !v.is_empty());

        let docker_tls_verify = env::var("DOCKER_TLS_VERIFY")
            .map(|v| !v.is_empty() && v != "0")
            .unwrap_or(false);

        let docker_cert_path = env::var("DOCKER_CERT_PATH")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let docker_timeout_secs = env::var("SLIMBOX_DOCKER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DOCKER_TIMEOUT_SECS);

        let continue_after_timeout_secs = env::var("SLIMBOX_CONTINUE_AFTER_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CONTINUE_AFTER_TIMEOUT_SECS);

        let log_level = env::var("SLIMBOX_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            state_path,
            docker_host,
            docker_tls_verify,
            docker_cert_path,
            docker_timeout_secs,
            continue_after_timeout_secs,
            log_level,
        }
    }
}

fn default_state_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("slimbox")
        .join("state")
}

impl SlimboxConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "State path cannot be empty".to_string(),
            ));
        }

        if self.docker_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Docker timeout must be at least 1 second".to_string(),
            ));
        }
        if self.docker_timeout_secs > MAX_DOCKER_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Docker timeout cannot exceed 1 hour".to_string(),
            ));
        }

        if self.continue_after_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Continue-after timeout must be at least 1 second".to_string(),
            ));
        }

        if self.docker_tls_verify && self.docker_cert_path.is_none() {
            return Err(ConfigError::ValidationFailed(
                "DOCKER_TLS_VERIFY is set but DOCKER_CERT_PATH is not".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn docker_client_config(&self) -> DockerClientConfig {
        DockerClientConfig {
            host: self.docker_host.clone(),
            tls_verify: self.docker_tls_verify,
            cert_path: self.docker_cert_path.clone(),
            timeout_secs: self.docker_timeout_secs,
        }
    }

    pub fn continue_after_timeout(&self) -> Duration {
        Duration::from_secs(self.continue_after_timeout_secs)
    }

    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(
            "state_path".to_string(),
            self.state_path.display().to_string(),
        );
        map.insert(
            "docker_host".to_string(),
            self.docker_host
                .clone()
                .unwrap_or_else(|| "(local default)".to_string()),
        );
        map.insert(
            "docker_tls_verify".to_string(),
            self.docker_tls_verify.to_string(),
        );
        map.insert(
            "docker_timeout_secs".to_string(),
            self.docker_timeout_secs.to_string(),
        );
        map.insert(
            "continue_after_timeout_secs".to_string(),
            self.continue_after_timeout_secs.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());
        map
    }
}

impl fmt::Display for SlimboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Slimbox Configuration:")?;
        writeln!(f, "  State Path: {}", self.state_path.display())?;
        if let Some(ref host) = self.docker_host {
            writeln!(f, "  Docker Host: {}", host)?;
        }
        writeln!(f, "  Docker TLS Verify: {}", self.docker_tls_verify)?;
        if let Some(ref dir) = self.docker_cert_path {
            writeln!(f, "  Docker Cert Path: {}", dir.display())?;
        }
        writeln!(f, "  Docker Timeout: {}s", self.docker_timeout_secs)?;
        writeln!(
            f,
            "  Continue-After Timeout: {}s",
            self.continue_after_timeout_secs
        )?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
