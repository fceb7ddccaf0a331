use crate::toolkit::{ContainerInspector, ContainerSpec};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Where the run directory appears inside the instrumented container
pub const CONTAINER_MOUNT_POINT: &str = "/opt/slimbox";

const REPORT_FILE: &str = "creport.json";
const MANIFEST_FILE: &str = "files.json";
const FILES_DIR: &str = "files";
const DONE_MARKER: &str = "monitor.done";
const STOP_TIMEOUT_SECS: i64 = 10;
const REPORT_WAIT: Duration = Duration::from_secs(5);
const REPORT_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Deserialize)]
struct ContainerReport {
    #[serde(default)]
    files: Vec<ReportedFile>,
}

#[derive(Debug, Deserialize)]
struct ReportedFile {
    path: String,
}

#[derive(Debug, Serialize)]
struct FileManifest<'a> {
    files: &'a BTreeSet<String>,
}

/// What `process_report` kept and dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub files: usize,
    pub excluded: usize,
    pub included: usize,
}

/// Runs the fat image with monitoring parameters and collects what it reports
pub struct DockerContainerInspector {
    docker: Docker,
    spec: ContainerSpec,
    name: String,
    container_id: Option<String>,
    host_ports: Vec<u16>,
}

impl DockerContainerInspector {
    pub fn new(docker: Docker, spec: ContainerSpec) -> Self {
        let name = format!("slimbox_{}", uuid::Uuid::new_v4().simple());
        Self {
            docker,
            spec,
            name,
            container_id: None,
            host_ports: Vec::new(),
        }
    }

    fn container_config(&self) -> Config<String> {
        let overrides = &self.spec.overrides;
        let image = &self.spec.image;

        let entrypoint = (overrides.clear_entrypoint || overrides.entrypoint.is_some())
            .then(|| overrides.resolve_entrypoint(None))
            .flatten();
        let cmd = (overrides.clear_cmd || overrides.cmd.is_some())
            .then(|| overrides.resolve_cmd(None))
            .flatten();

        let mut env = overrides.env.clone();
        env.extend(monitor_env(&self.spec));

        let exposed_ports: HashMap<String, HashMap<(), ()>> = overrides
            .merge_ports(&image.config.exposed_ports)
            .into_iter()
            .map(|p| (p, HashMap::new()))
            .collect();

        let mut binds = vec![format!(
            "{}:{}",
            self.spec.local_volume_path.display(),
            CONTAINER_MOUNT_POINT
        )];
        binds.extend(self.spec.volume_mounts.iter().map(|m| {
            let mode = if m.read_only { ":ro" } else { "" };
            format!("{}:{}{}", m.source.display(), m.destination, mode)
        }));

        Config {
            image: Some(image.id.clone()),
            entrypoint,
            cmd,
            working_dir: overrides.workdir.clone(),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                binds: Some(binds),
                publish_all_ports: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn container_id(&self) -> Result<&str> {
        self.container_id
            .as_deref()
            .ok_or_else(|| anyhow!("Container {} was not started", self.name))
    }

    async fn record_host_ports(&mut self) -> Result<()> {
        let id = self.container_id()?.to_string();
        let inspect = self
            .docker
            .inspect_container(&id, None)
            .await
            .context("Failed to inspect container")?;

        let mut ports: Vec<u16> = inspect
            .network_settings
            .and_then(|ns| ns.ports)
            .unwrap_or_default()
            .into_values()
            .flatten()
            .flatten()
            .filter_map(|binding| binding.host_port)
            .filter_map(|port| port.parse::<u16>().ok())
            .collect();
        ports.sort_unstable();
        ports.dedup();

        debug!(container = %self.name, ports = ?ports, "Published host ports");
        self.host_ports = ports;
        Ok(())
    }

    async fn print_logs(&self, id: &str) {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        eprintln!("slimbox: container {} logs:", self.name);
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(output) => eprint!("{}", output),
                Err(e) => {
                    warn!("Failed to read container logs: {}", e);
                    break;
                }
            }
        }
        eprintln!("slimbox: end of container logs");
    }
}

fn monitor_env(spec: &ContainerSpec) -> Vec<String> {
    let join = |paths: &BTreeSet<String>| paths.iter().cloned().collect::<Vec<_>>().join(":");
    vec![
        format!("SLIMBOX_ARTIFACTS_DIR={}/artifacts", CONTAINER_MOUNT_POINT),
        format!("SLIMBOX_INCLUDE_PATHS={}", join(&spec.include_paths)),
        format!("SLIMBOX_EXCLUDE_PATHS={}", join(&spec.exclude_paths)),
        format!("SLIMBOX_DEBUG={}", spec.debug),
    ]
}

#[async_trait]
impl ContainerInspector for DockerContainerInspector {
    async fn run_container(&mut self) -> Result<()> {
        let config = self.container_config();
        let options = CreateContainerOptions {
            name: self.name.clone(),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .context("Failed to create container")?;
        for warning in &created.warnings {
            warn!("Docker: {}", warning);
        }
        self.container_id = Some(created.id.clone());

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .context("Failed to start container")?;
        info!("Started container {} ({})", self.name, created.id);

        self.record_host_ports().await
    }

    async fn finish_monitoring(&mut self) {
        let marker = self.spec.local_volume_path.join(DONE_MARKER);
        if let Err(e) = tokio::fs::write(&marker, b"").await {
            warn!("Failed to signal the container monitor: {}", e);
        }

        let report = self.spec.artifact_location.join(REPORT_FILE);
        let waited = tokio::time::timeout(REPORT_WAIT, async {
            while !report.is_file() {
                tokio::time::sleep(REPORT_POLL).await;
            }
        })
        .await;

        if waited.is_err() {
            debug!("No container report after {:?}", REPORT_WAIT);
        }
    }

    async fn shutdown_container(&mut self) -> Result<()> {
        let id = self.container_id()?.to_string();

        if self.spec.show_logs {
            self.print_logs(&id).await;
        }

        if let Err(e) = self
            .docker
            .stop_container(&id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
        {
            debug!("Stopping container {} failed: {}", self.name, e);
        }

        self.docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .with_context(|| format!("Failed to remove container {}", self.name))?;

        self.container_id = None;
        Ok(())
    }

    fn has_collected_data(&self) -> bool {
        self.spec.artifact_location.join(REPORT_FILE).is_file()
    }

    async fn process_collected_data(&mut self) -> Result<()> {
        let location = self.spec.artifact_location.clone();
        let exclude = self.spec.exclude_paths.clone();
        let include = self.spec.include_paths.clone();

        let summary =
            tokio::task::spawn_blocking(move || process_report(&location, &exclude, &include))
                .await
                .context("Report processing task failed")??;

        info!(
            files = summary.files,
            excluded = summary.excluded,
            included = summary.included,
            "Processed container report"
        );
        Ok(())
    }

    fn probe_targets(&self) -> Vec<String> {
        self.host_ports
            .iter()
            .map(|port| format!("http://127.0.0.1:{}", port))
            .collect()
    }
}

/// Reads `creport.json`, applies exclude and include paths, and writes the
/// sorted `files.json` manifest.
///
/// Excluded paths are also deleted from the copied `files` tree.
pub fn process_report(
    artifact_location: &Path,
    exclude_paths: &BTreeSet<String>,
    include_paths: &BTreeSet<String>,
) -> Result<ReportSummary> {
    let report_path = artifact_location.join(REPORT_FILE);
    let raw = fs::read_to_string(&report_path)
        .with_context(|| format!("Failed to read {}", report_path.display()))?;
    let report: ContainerReport = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", report_path.display()))?;

    let reported: BTreeSet<String> = report.files.into_iter().map(|f| f.path).collect();
    let mut files: BTreeSet<String> = reported
        .iter()
        .filter(|p| !is_excluded(p, exclude_paths))
        .cloned()
        .collect();
    let excluded = reported.len() - files.len();

    remove_excluded_files(&artifact_location.join(FILES_DIR), exclude_paths)?;

    let before = files.len();
    files.extend(include_paths.iter().cloned());
    let included = files.len() - before;

    let manifest_path = artifact_location.join(MANIFEST_FILE);
    let manifest = serde_json::to_string_pretty(&FileManifest { files: &files })
        .context("Failed to serialize file manifest")?;
    fs::write(&manifest_path, manifest)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    Ok(ReportSummary {
        files: files.len(),
        excluded,
        included,
    })
}

fn is_excluded(path: &str, exclude_paths: &BTreeSet<String>) -> bool {
    exclude_paths.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        prefix.is_empty()
            || path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn remove_excluded_files(files_root: &Path, exclude_paths: &BTreeSet<String>) -> Result<()> {
    if exclude_paths.is_empty() || !files_root.is_dir() {
        return Ok(());
    }

    let doomed: Vec<PathBuf> = WalkDir::new(files_root)
        .min_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .strip_prefix(files_root)
                .map(|rel| is_excluded(&format!("/{}", rel.display()), exclude_paths))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    for path in doomed {
        // a parent directory may already have taken it
        if !path.exists() && path.symlink_metadata().is_err() {
            continue;
        }
        let result = if path.is_dir() && !path.is_symlink() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.with_context(|| format!("Failed to remove excluded {}", path.display()))?;
    }
    Ok(())
}
