use super::dockerfile::render_slim_dockerfile;
use crate::toolkit::{BuilderSpec, ImageBuilder};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use std::path::Path;
use tracing::{debug, info};

const FILES_DIR: &str = "files";
const DOCKERFILE: &str = "Dockerfile";

/// Builds the minimized image from the artifact location
pub struct DockerImageBuilder {
    docker: Docker,
    spec: BuilderSpec,
    has_data: bool,
}

impl DockerImageBuilder {
    pub fn new(docker: Docker, spec: BuilderSpec) -> Self {
        let has_data = has_file_data(&spec.artifact_location);
        Self {
            docker,
            spec,
            has_data,
        }
    }

    pub fn dockerfile(&self) -> String {
        render_slim_dockerfile(&self.spec, self.has_data)
    }
}

#[async_trait]
impl ImageBuilder for DockerImageBuilder {
    fn has_data(&self) -> bool {
        self.has_data
    }

    fn repo_name(&self) -> &str {
        &self.spec.target_tag
    }

    async fn build(&mut self) -> Result<()> {
        let dockerfile = self.dockerfile();
        let location = self.spec.artifact_location.clone();
        let has_data = self.has_data;

        tokio::fs::write(location.join(DOCKERFILE), &dockerfile)
            .await
            .context("Failed to write Dockerfile")?;
        debug!("Generated Dockerfile:\n{}", dockerfile);

        let context =
            tokio::task::spawn_blocking(move || build_context(&location, &dockerfile, has_data))
                .await
                .context("Build context task failed")??;

        let options = BuildImageOptions {
            dockerfile: DOCKERFILE.to_string(),
            t: self.spec.target_tag.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(context)));

        while let Some(item) = stream.next().await {
            let info = item.context("Docker build failed")?;
            if let Some(error) = info.error {
                bail!("Docker build failed: {}", error.trim());
            }
            if let Some(line) = info.stream.as_deref().map(str::trim) {
                if !line.is_empty() {
                    debug!("build: {}", line);
                }
            }
        }

        info!("Built image {}", self.spec.target_tag);
        Ok(())
    }
}

fn has_file_data(artifact_location: &Path) -> bool {
    std::fs::read_dir(artifact_location.join(FILES_DIR))
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Tar archive holding the Dockerfile and, with data, the `files` tree
fn build_context(artifact_location: &Path, dockerfile: &str, has_data: bool) -> Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.follow_symlinks(false);

    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    archive
        .append_data(&mut header, DOCKERFILE, dockerfile.as_bytes())
        .context("Failed to add Dockerfile to build context")?;

    if has_data {
        archive
            .append_dir_all(FILES_DIR, artifact_location.join(FILES_DIR))
            .context("Failed to add files to build context")?;
    }

    archive
        .into_inner()
        .context("Failed to finish build context")
}
