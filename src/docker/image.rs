use super::dockerfile::reverse_history;
use crate::toolkit::{ImageConfig, ImageInfo, ImageInspector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::models::ImageInspect;
use bollard::Docker;
use std::path::PathBuf;
use tracing::{debug, info};

const FAT_DOCKERFILE: &str = "Dockerfile.fat";
const SHORT_ID_LEN: usize = 12;

/// Looks up the fat image and reconstructs its build instructions
pub struct DockerImageInspector {
    docker: Docker,
    image_ref: String,
    found: Option<ImageInspect>,
    info: Option<ImageInfo>,
    history: Vec<String>,
    instructions: Vec<String>,
    artifact_location: Option<PathBuf>,
}

impl DockerImageInspector {
    /// Checks whether `image_ref` exists. A missing image is not an error.
    pub async fn resolve(docker: Docker, image_ref: &str) -> Result<Self> {
        let found = match docker.inspect_image(image_ref).await {
            Ok(inspect) => Some(inspect),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => None,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to look up image {}", image_ref))
            }
        };

        Ok(Self {
            docker,
            image_ref: image_ref.to_string(),
            found,
            info: None,
            history: Vec::new(),
            instructions: Vec::new(),
            artifact_location: None,
        })
    }
}

#[async_trait]
impl ImageInspector for DockerImageInspector {
    fn image_exists(&self) -> bool {
        self.found.is_some()
    }

    async fn inspect(&mut self) -> Result<()> {
        let inspect = self
            .found
            .as_ref()
            .with_context(|| format!("Image {} was not resolved", self.image_ref))?;
        let info = image_info(inspect)?;

        let history = self
            .docker
            .image_history(&info.id)
            .await
            .with_context(|| format!("Failed to read history of {}", info.id))?;
        self.history = history.into_iter().map(|h| h.created_by).collect();

        debug!(
            id = %info.id,
            layers = self.history.len(),
            "Inspected image"
        );
        self.info = Some(info);
        Ok(())
    }

    fn image_info(&self) -> Option<&ImageInfo> {
        self.info.as_ref()
    }

    fn set_artifact_location(&mut self, location: PathBuf) {
        self.artifact_location = Some(location);
    }

    async fn process_collected_data(&mut self) -> Result<()> {
        self.instructions = reverse_history(&self.history);

        let location = self
            .artifact_location
            .as_ref()
            .context("Artifact location is not set")?;
        let path = location.join(FAT_DOCKERFILE);
        let mut contents = self.instructions.join("\n");
        contents.push('\n');
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Reverse-engineered Dockerfile saved to {}", path.display());
        Ok(())
    }

    fn slim_image_repo(&self) -> String {
        let tags = self
            .info
            .as_ref()
            .map(|i| i.repo_tags.as_slice())
            .unwrap_or_default();
        let id = self.info.as_ref().map(|i| i.id.as_str()).unwrap_or("");
        slim_repo_name(tags, id)
    }

    fn fat_image_instructions(&self) -> Vec<String> {
        if self.instructions.is_empty() {
            reverse_history(&self.history)
        } else {
            self.instructions.clone()
        }
    }
}

fn image_info(inspect: &ImageInspect) -> Result<ImageInfo> {
    let id = inspect.id.clone().context("Image inspect returned no ID")?;
    let config = inspect
        .config
        .as_ref()
        .map(|c| {
            let mut exposed_ports: Vec<String> = c
                .exposed_ports
                .as_ref()
                .map(|p| p.keys().cloned().collect())
                .unwrap_or_default();
            exposed_ports.sort();
            ImageConfig {
                entrypoint: c.entrypoint.clone(),
                cmd: c.cmd.clone(),
                workdir: c.working_dir.clone().filter(|w| !w.is_empty()),
                env: c.env.clone().unwrap_or_default(),
                exposed_ports,
                user: c.user.clone().filter(|u| !u.is_empty()),
            }
        })
        .unwrap_or_default();

    Ok(ImageInfo {
        id,
        virtual_size: inspect.size.unwrap_or_default(),
        repo_tags: inspect.repo_tags.clone().unwrap_or_default(),
        config,
    })
}

/// `nginx:latest` becomes `nginx.slim`; untagged images get `slim-<short id>`
pub fn slim_repo_name(repo_tags: &[String], image_id: &str) -> String {
    let repo = repo_tags
        .iter()
        .filter(|t| t.as_str() != "<none>:<none>")
        .map(|t| strip_tag(t))
        .find(|r| !r.is_empty());

    match repo {
        Some(repo) => format!("{}.slim", repo),
        None => {
            let id = image_id.strip_prefix("sha256:").unwrap_or(image_id);
            format!("slim-{}", &id[..id.len().min(SHORT_ID_LEN)])
        }
    }
}

/// Removes the tag but keeps a registry port (`localhost:5000/app:1` -> `localhost:5000/app`)
fn strip_tag(reference: &str) -> &str {
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(idx) => &reference[..name_start + idx],
        None => reference,
    }
}
