//! Collaborators driven by the build pipeline
//!
//! The orchestrator only sees these traits. [`Toolkit`] is the factory that
//! connects to the container engine and constructs the per-run collaborators;
//! [`crate::docker::DockerToolkit`] is the production implementation.

use crate::pipeline::completion::CompletionSignal;
use crate::pipeline::request::{
    ContainerOverrides, DockerClientConfig, HttpProbeCmd, ImageOverrides, VolumeMount,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Image configuration relevant to running and rebuilding the image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageConfig {
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub workdir: Option<String>,
    pub env: Vec<String>,
    pub exposed_ports: Vec<String>,
    pub user: Option<String>,
}

/// Resolved metadata of the fat image
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub id: String,
    pub virtual_size: i64,
    pub repo_tags: Vec<String>,
    pub config: ImageConfig,
}

/// Everything needed to launch the instrumented container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: ImageInfo,
    pub local_volume_path: PathBuf,
    pub artifact_location: PathBuf,
    pub overrides: ContainerOverrides,
    pub show_logs: bool,
    pub volume_mounts: Vec<VolumeMount>,
    pub exclude_paths: BTreeSet<String>,
    pub include_paths: BTreeSet<String>,
    pub debug: bool,
}

/// Everything needed to build the minimized image
#[derive(Debug, Clone)]
pub struct BuilderSpec {
    pub target_tag: String,
    pub image: ImageInfo,
    pub artifact_location: PathBuf,
    pub image_overrides: ImageOverrides,
    pub overrides: ContainerOverrides,
}

/// Resolves and inspects the fat image
#[async_trait]
pub trait ImageInspector: Send + Sync {
    fn image_exists(&self) -> bool;

    async fn inspect(&mut self) -> Result<()>;

    /// Metadata, available once `inspect` succeeded
    fn image_info(&self) -> Option<&ImageInfo>;

    fn set_artifact_location(&mut self, location: PathBuf);

    /// Derives the structural data the builder needs later
    async fn process_collected_data(&mut self) -> Result<()>;

    /// Repository name used when no custom tag is given
    fn slim_image_repo(&self) -> String;

    /// Reconstructed build instructions of the fat image
    fn fat_image_instructions(&self) -> Vec<String>;
}

/// Owns the instrumented container and its monitoring session
#[async_trait]
pub trait ContainerInspector: Send + Sync {
    async fn run_container(&mut self) -> Result<()>;

    async fn finish_monitoring(&mut self);

    async fn shutdown_container(&mut self) -> Result<()>;

    fn has_collected_data(&self) -> bool;

    async fn process_collected_data(&mut self) -> Result<()>;

    /// Base URLs the HTTP probe should hit (one per published port)
    fn probe_targets(&self) -> Vec<String>;
}

/// Exercises the running container and reports when it is done
pub trait HttpProbe: Send + Sync {
    fn start(&mut self);

    /// Takes the completion signal; `None` once it was already taken
    fn done_signal(&mut self) -> Option<CompletionSignal>;
}

/// Builds the minimized image
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    fn has_data(&self) -> bool;

    fn repo_name(&self) -> &str;

    async fn build(&mut self) -> Result<()>;
}

/// Connects to the container engine and constructs collaborators
#[async_trait]
pub trait Toolkit: Send + Sync {
    type Client: Clone + Send + Sync;

    async fn connect(&self, config: &DockerClientConfig) -> Result<Self::Client>;

    async fn image_inspector(
        &self,
        client: &Self::Client,
        image_ref: &str,
    ) -> Result<Box<dyn ImageInspector>>;

    fn container_inspector(
        &self,
        client: &Self::Client,
        spec: ContainerSpec,
    ) -> Result<Box<dyn ContainerInspector>>;

    fn http_probe(
        &self,
        container: &dyn ContainerInspector,
        commands: &[HttpProbeCmd],
    ) -> Result<Box<dyn HttpProbe>>;

    fn image_builder(&self, client: &Self::Client, spec: BuilderSpec)
        -> Result<Box<dyn ImageBuilder>>;
}
