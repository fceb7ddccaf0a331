//! Build request and the value types it carries
//!
//! A [`BuildRequest`] is created once per invocation and never mutated. The
//! smaller types here (overrides, mounts, probe commands) also know how to parse
//! themselves from their command-line syntax.

use super::continue_after::ContinueAfter;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Default Docker API request timeout
pub const DEFAULT_DOCKER_TIMEOUT_SECS: u64 = 120;

/// Errors produced while parsing request values from their text form
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid volume mount '{0}'. Expected SOURCE:DESTINATION[:ro|rw]")]
    InvalidMount(String),

    #[error("Invalid HTTP probe command '{0}'. Expected [PROTO:][METHOD:]RESOURCE")]
    InvalidProbeCommand(String),

    #[error("Unknown image override '{0}'. Valid options: entrypoint, cmd, workdir, env, expose, all")]
    UnknownImageOverride(String),

    #[error("Invalid command '{0}': {1}")]
    InvalidExecForm(String, String),
}

/// How to reach the Docker daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerClientConfig {
    /// Daemon address (`unix://`, `tcp://` or `http://`); local defaults when unset
    pub host: Option<String>,

    /// Use TLS with client certificates from `cert_path`
    pub tls_verify: bool,

    /// Directory holding `key.pem`, `cert.pem` and `ca.pem`
    pub cert_path: Option<PathBuf>,

    /// API request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DockerClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            tls_verify: false,
            cert_path: None,
            timeout_secs: DEFAULT_DOCKER_TIMEOUT_SECS,
        }
    }
}

/// Runtime overrides applied to the instrumented container
///
/// Each field is independently settable; entrypoint and cmd can also be
/// cleared, which wins over any value set for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerOverrides {
    pub entrypoint: Option<Vec<String>>,
    pub clear_entrypoint: bool,
    pub cmd: Option<Vec<String>>,
    pub clear_cmd: bool,
    pub workdir: Option<String>,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
}

impl ContainerOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Effective entrypoint given the image's own entrypoint
    pub fn resolve_entrypoint(&self, image: Option<&[String]>) -> Option<Vec<String>> {
        resolve_exec(
            self.clear_entrypoint,
            self.entrypoint.as_deref(),
            image,
        )
    }

    /// Effective cmd given the image's own cmd
    pub fn resolve_cmd(&self, image: Option<&[String]>) -> Option<Vec<String>> {
        resolve_exec(self.clear_cmd, self.cmd.as_deref(), image)
    }

    pub fn resolve_workdir(&self, image: Option<&str>) -> Option<String> {
        self.workdir
            .clone()
            .or_else(|| image.filter(|w| !w.is_empty()).map(str::to_string))
    }

    /// Image environment with overridden keys replaced and new keys appended
    pub fn merge_env(&self, image: &[String]) -> Vec<String> {
        let mut merged: Vec<String> = image
            .iter()
            .filter(|entry| {
                let key = env_key(entry);
                !self.env.iter().any(|o| env_key(o) == key)
            })
            .cloned()
            .collect();
        merged.extend(self.env.iter().cloned());
        merged
    }

    /// Union of image and override ports, normalized to `port/proto`
    pub fn merge_ports(&self, image: &[String]) -> Vec<String> {
        let ports: BTreeSet<String> = image
            .iter()
            .chain(self.exposed_ports.iter())
            .map(|p| normalize_port(p))
            .collect();
        ports.into_iter().collect()
    }
}

fn resolve_exec(
    clear: bool,
    value: Option<&[String]>,
    image: Option<&[String]>,
) -> Option<Vec<String>> {
    if clear {
        Some(Vec::new())
    } else if let Some(v) = value {
        Some(v.to_vec())
    } else {
        image.map(<[String]>::to_vec)
    }
}

fn env_key(entry: &str) -> &str {
    entry.split_once('=').map(|(k, _)| k).unwrap_or(entry)
}

/// `8080` becomes `8080/tcp`; values with a protocol are kept as-is
pub fn normalize_port(port: &str) -> String {
    if port.contains('/') {
        port.to_string()
    } else {
        format!("{}/tcp", port)
    }
}

/// Parses a command given either as a JSON array or as whitespace-separated words
pub fn parse_exec_form(value: &str) -> Result<Vec<String>, ParseError> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<String>>(trimmed)
            .map_err(|e| ParseError::InvalidExecForm(value.to_string(), e.to_string()))
    } else {
        Ok(trimmed.split_whitespace().map(str::to_string).collect())
    }
}

/// Which container overrides are also baked into the minimized image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImageOverrides {
    pub entrypoint: bool,
    pub cmd: bool,
    pub workdir: bool,
    pub env: bool,
    pub expose: bool,
}

impl ImageOverrides {
    pub fn all() -> Self {
        Self {
            entrypoint: true,
            cmd: true,
            workdir: true,
            env: true,
            expose: true,
        }
    }
}

impl FromStr for ImageOverrides {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut overrides = ImageOverrides::default();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match item.to_lowercase().as_str() {
                "all" => return Ok(ImageOverrides::all()),
                "entrypoint" => overrides.entrypoint = true,
                "cmd" => overrides.cmd = true,
                "workdir" => overrides.workdir = true,
                "env" => overrides.env = true,
                "expose" => overrides.expose = true,
                _ => return Err(ParseError::UnknownImageOverride(item.to_string())),
            }
        }
        Ok(overrides)
    }
}

/// A host path mounted into the instrumented container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeMount {
    pub source: PathBuf,
    pub destination: String,
    pub read_only: bool,
}

impl FromStr for VolumeMount {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidMount(s.to_string());
        let parts: Vec<&str> = s.split(':').collect();
        let (source, destination, read_only) = match parts.as_slice() {
            [src, dst] => (*src, *dst, false),
            [src, dst, "ro"] => (*src, *dst, true),
            [src, dst, "rw"] => (*src, *dst, false),
            _ => return Err(invalid()),
        };
        if source.is_empty() || !destination.starts_with('/') {
            return Err(invalid());
        }
        Ok(VolumeMount {
            source: PathBuf::from(source),
            destination: destination.to_string(),
            read_only,
        })
    }
}

/// One request the HTTP probe sends to every published port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HttpProbeCmd {
    pub protocol: String,
    pub method: String,
    pub resource: String,
}

impl Default for HttpProbeCmd {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            method: "GET".to_string(),
            resource: "/".to_string(),
        }
    }
}

impl fmt::Display for HttpProbeCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.protocol, self.method, self.resource)
    }
}

impl FromStr for HttpProbeCmd {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidProbeCommand(s.to_string());
        let mut cmd = HttpProbeCmd::default();
        let mut protocol_set = false;
        let mut method_set = false;
        let mut rest = s.trim();

        while !rest.starts_with('/') {
            let (head, tail) = rest.split_once(':').ok_or_else(invalid)?;
            let lowered = head.to_ascii_lowercase();
            if !protocol_set && !method_set && (lowered == "http" || lowered == "https") {
                cmd.protocol = lowered;
                protocol_set = true;
            } else if !method_set
                && !head.is_empty()
                && head.chars().all(|c| c.is_ascii_alphabetic())
            {
                cmd.method = head.to_ascii_uppercase();
                method_set = true;
            } else {
                return Err(invalid());
            }
            rest = tail;
        }

        cmd.resource = rest.to_string();
        Ok(cmd)
    }
}

/// Everything one build invocation needs
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub image_ref: String,
    pub custom_tag: Option<String>,
    pub debug: bool,
    pub state_path: PathBuf,
    pub docker: DockerClientConfig,
    pub overrides: ContainerOverrides,
    pub image_overrides: ImageOverrides,
    pub volume_mounts: Vec<VolumeMount>,
    pub include_paths: BTreeSet<String>,
    pub exclude_paths: BTreeSet<String>,
    pub http_probe: bool,
    pub http_probe_cmds: Vec<HttpProbeCmd>,
    pub remove_file_artifacts: bool,
    pub show_container_logs: bool,
    pub continue_after: ContinueAfter,
}

impl BuildRequest {
    /// A request with every optional feature off and `enter` as continue-after mode
    pub fn new(image_ref: impl Into<String>, state_path: impl AsRef<Path>) -> Self {
        Self {
            image_ref: image_ref.into(),
            custom_tag: None,
            debug: false,
            state_path: state_path.as_ref().to_path_buf(),
            docker: DockerClientConfig::default(),
            overrides: ContainerOverrides::default(),
            image_overrides: ImageOverrides::default(),
            volume_mounts: Vec::new(),
            include_paths: BTreeSet::new(),
            exclude_paths: BTreeSet::new(),
            http_probe: false,
            http_probe_cmds: Vec::new(),
            remove_file_artifacts: false,
            show_container_logs: false,
            continue_after: ContinueAfter::Enter,
        }
    }

    /// Probe commands to run; a bare `GET /` when probing was requested without any
    pub fn effective_probe_cmds(&self) -> Vec<HttpProbeCmd> {
        if self.http_probe_cmds.is_empty() {
            vec![HttpProbeCmd::default()]
        } else {
            self.http_probe_cmds.clone()
        }
    }

    /// One-line description printed when a build starts
    pub fn summary(&self) -> String {
        let o = &self.overrides;
        format!(
            "image={} http-probe={} remove-file-artifacts={} continue-after={} image-overrides={:?} \
             entrypoint={:?} ({}) cmd={:?} ({}) workdir='{}' env={:?} expose={:?}",
            self.image_ref,
            self.http_probe,
            self.remove_file_artifacts,
            self.continue_after,
            self.image_overrides,
            o.entrypoint,
            o.clear_entrypoint,
            o.cmd,
            o.clear_cmd,
            o.workdir.as_deref().unwrap_or(""),
            o.env,
            o.exposed_ports,
        )
    }
}
