//! Shared helpers for the pipeline integration tests
//!
//! [`MockToolkit`] hands out collaborators that append every call to a shared
//! [`Journal`], so tests can assert on the exact sequence of side effects.
//! Any journal entry name can be made to fail through [`MockToolkit::failing`].

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use slimbox::pipeline::request::{DockerClientConfig, HttpProbeCmd};
use slimbox::pipeline::{completion, Completion, CompletionSignal};
use slimbox::toolkit::{BuilderSpec, ContainerSpec, ImageConfig};
use slimbox::{
    ContainerInspector, HttpProbe, ImageBuilder, ImageInfo, ImageInspector, ProgressEvent,
    ProgressHandler, Toolkit,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MOCK_IMAGE_ID: &str = "sha256:0123456789abcdef";
pub const MOCK_SLIM_REPO: &str = "mock.slim";
pub const DONE_MARKER: &str = "monitor.done";
pub const REPORT_FILE: &str = "creport.json";

/// Ordered record of collaborator calls
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == entry)
    }

    /// True when `first` was recorded before `second`
    pub fn before(&self, first: &str, second: &str) -> bool {
        match (self.position(first), self.position(second)) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub image_exists: bool,
    pub collected_data: bool,
    pub file_data: bool,
    pub probe_targets: Vec<String>,
    pub probe_delay: Duration,
    pub builder_removes_artifacts: bool,
    pub fail: HashSet<String>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            image_exists: true,
            collected_data: true,
            file_data: true,
            probe_targets: vec!["http://127.0.0.1:32768".to_string()],
            probe_delay: Duration::from_millis(100),
            builder_removes_artifacts: false,
            fail: HashSet::new(),
        }
    }
}

impl MockBehavior {
    fn check(&self, journal: &Journal, call: &str) -> Result<()> {
        journal.record(call);
        if self.fail.contains(call) {
            bail!("injected failure in {}", call);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockToolkit {
    journal: Journal,
    behavior: MockBehavior,
}

impl MockToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn failing(mut self, call: &str) -> Self {
        self.behavior.fail.insert(call.to_string());
        self
    }

    pub fn missing_image(mut self) -> Self {
        self.behavior.image_exists = false;
        self
    }

    pub fn without_collected_data(mut self) -> Self {
        self.behavior.collected_data = false;
        self
    }

    pub fn without_file_data(mut self) -> Self {
        self.behavior.file_data = false;
        self
    }

    pub fn with_probe_targets(mut self, targets: Vec<String>) -> Self {
        self.behavior.probe_targets = targets;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.behavior.probe_delay = delay;
        self
    }

    pub fn builder_removes_artifacts(mut self) -> Self {
        self.behavior.builder_removes_artifacts = true;
        self
    }
}

#[async_trait]
impl Toolkit for MockToolkit {
    type Client = ();

    async fn connect(&self, _config: &DockerClientConfig) -> Result<()> {
        self.behavior.check(&self.journal, "connect")
    }

    async fn image_inspector(
        &self,
        _client: &(),
        image_ref: &str,
    ) -> Result<Box<dyn ImageInspector>> {
        self.behavior.check(&self.journal, "image.resolve")?;
        Ok(Box::new(MockImageInspector {
            journal: self.journal.clone(),
            behavior: self.behavior.clone(),
            image_ref: image_ref.to_string(),
            info: None,
            artifact_location: None,
        }))
    }

    fn container_inspector(
        &self,
        _client: &(),
        spec: ContainerSpec,
    ) -> Result<Box<dyn ContainerInspector>> {
        self.behavior.check(&self.journal, "container.create")?;
        Ok(Box::new(MockContainerInspector {
            journal: self.journal.clone(),
            behavior: self.behavior.clone(),
            spec,
        }))
    }

    fn http_probe(
        &self,
        container: &dyn ContainerInspector,
        commands: &[HttpProbeCmd],
    ) -> Result<Box<dyn HttpProbe>> {
        self.behavior.check(&self.journal, "probe.create")?;
        let (done, signal) = completion();
        Ok(Box::new(MockHttpProbe {
            journal: self.journal.clone(),
            targets: container.probe_targets(),
            commands: commands.to_vec(),
            delay: self.behavior.probe_delay,
            done: Some(done),
            signal: Some(signal),
        }))
    }

    fn image_builder(&self, _client: &(), spec: BuilderSpec) -> Result<Box<dyn ImageBuilder>> {
        self.behavior.check(&self.journal, "builder.create")?;
        Ok(Box::new(MockImageBuilder {
            journal: self.journal.clone(),
            behavior: self.behavior.clone(),
            spec,
        }))
    }
}

pub struct MockImageInspector {
    journal: Journal,
    behavior: MockBehavior,
    image_ref: String,
    info: Option<ImageInfo>,
    artifact_location: Option<PathBuf>,
}

#[async_trait]
impl ImageInspector for MockImageInspector {
    fn image_exists(&self) -> bool {
        self.behavior.image_exists
    }

    async fn inspect(&mut self) -> Result<()> {
        self.behavior.check(&self.journal, "image.inspect")?;
        self.info = Some(ImageInfo {
            id: MOCK_IMAGE_ID.to_string(),
            virtual_size: 187_000_000,
            repo_tags: vec![self.image_ref.clone()],
            config: ImageConfig {
                cmd: Some(vec!["serve".to_string()]),
                exposed_ports: vec!["8080/tcp".to_string()],
                ..Default::default()
            },
        });
        Ok(())
    }

    fn image_info(&self) -> Option<&ImageInfo> {
        self.info.as_ref()
    }

    fn set_artifact_location(&mut self, location: PathBuf) {
        self.journal.record("image.set_artifact_location");
        self.artifact_location = Some(location);
    }

    async fn process_collected_data(&mut self) -> Result<()> {
        self.behavior.check(&self.journal, "image.process")
    }

    fn slim_image_repo(&self) -> String {
        self.journal.record("image.slim_repo");
        MOCK_SLIM_REPO.to_string()
    }

    fn fat_image_instructions(&self) -> Vec<String> {
        vec!["ADD file:mock in /".to_string(), "CMD [\"serve\"]".to_string()]
    }
}

pub struct MockContainerInspector {
    journal: Journal,
    behavior: MockBehavior,
    spec: ContainerSpec,
}

impl MockContainerInspector {
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }
}

#[async_trait]
impl ContainerInspector for MockContainerInspector {
    async fn run_container(&mut self) -> Result<()> {
        self.behavior.check(&self.journal, "container.run")?;
        if self.spec.local_volume_path.join(DONE_MARKER).exists() {
            self.journal.record("container.stale_marker");
        }
        if self.spec.artifact_location.join(REPORT_FILE).exists() {
            self.journal.record("container.stale_report");
        }
        Ok(())
    }

    async fn finish_monitoring(&mut self) {
        self.journal.record("container.finish_monitoring");
        let _ = std::fs::write(self.spec.local_volume_path.join(DONE_MARKER), b"");
        if self.behavior.collected_data {
            let _ = std::fs::write(self.spec.artifact_location.join(REPORT_FILE), b"{}");
        }
    }

    async fn shutdown_container(&mut self) -> Result<()> {
        self.behavior.check(&self.journal, "container.shutdown")
    }

    fn has_collected_data(&self) -> bool {
        self.journal.record("container.has_data");
        self.behavior.collected_data
    }

    async fn process_collected_data(&mut self) -> Result<()> {
        self.behavior.check(&self.journal, "container.process")
    }

    fn probe_targets(&self) -> Vec<String> {
        self.behavior.probe_targets.clone()
    }
}

/// Records one `probe.command N` entry per command and target, `delay` apart
pub struct MockHttpProbe {
    journal: Journal,
    targets: Vec<String>,
    commands: Vec<HttpProbeCmd>,
    delay: Duration,
    done: Option<Completion>,
    signal: Option<CompletionSignal>,
}

impl HttpProbe for MockHttpProbe {
    fn start(&mut self) {
        self.journal.record("probe.start");
        let Some(done) = self.done.take() else {
            return;
        };

        let journal = self.journal.clone();
        let calls = self.targets.len() * self.commands.len();
        let delay = self.delay;
        tokio::spawn(async move {
            for n in 0..calls {
                tokio::time::sleep(delay).await;
                journal.record(format!("probe.command {}", n));
            }
            journal.record("probe.done");
            done.fire();
        });
    }

    fn done_signal(&mut self) -> Option<CompletionSignal> {
        self.signal.take()
    }
}

pub struct MockImageBuilder {
    journal: Journal,
    behavior: MockBehavior,
    spec: BuilderSpec,
}

#[async_trait]
impl ImageBuilder for MockImageBuilder {
    fn has_data(&self) -> bool {
        self.behavior.file_data
    }

    fn repo_name(&self) -> &str {
        &self.spec.target_tag
    }

    async fn build(&mut self) -> Result<()> {
        self.behavior.check(&self.journal, "builder.build")?;
        if self.behavior.builder_removes_artifacts {
            std::fs::remove_dir_all(&self.spec.artifact_location)?;
        }
        Ok(())
    }
}

/// Progress handler that keeps every event it sees
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressHandler for RecordingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Input that never yields a line while the returned writer is alive
pub fn silent_input() -> (tokio::io::DuplexStream, tokio::io::BufReader<tokio::io::DuplexStream>) {
    let (writer, reader) = tokio::io::duplex(64);
    (writer, tokio::io::BufReader::new(reader))
}

/// Input that confirms `enter` right away
pub fn enter_input() -> std::io::Cursor<Vec<u8>> {
    std::io::Cursor::new(b"\n".to_vec())
}
