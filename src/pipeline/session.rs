//! State carried from one build phase to the next

use super::continue_after::ArmedWait;
use super::outcome::PhaseWarning;
use super::phase::Phase;
use super::request::BuildRequest;
use super::storage::RunDirs;
use crate::toolkit::{ContainerInspector, HttpProbe, ImageBuilder, ImageInfo, ImageInspector};
use anyhow::{anyhow, Result};

/// Results of the phases executed so far in one run
///
/// Each slot is filled by exactly one phase. The accessors fail when a later
/// phase asks for a slot whose phase has not completed.
pub struct BuildSession<C> {
    pub request: BuildRequest,
    pub client: Option<C>,
    pub image: Option<Box<dyn ImageInspector>>,
    pub run_dirs: Option<RunDirs>,
    pub container: Option<Box<dyn ContainerInspector>>,
    pub armed: Option<ArmedWait>,
    pub probe: Option<Box<dyn HttpProbe>>,
    pub target_tag: Option<String>,
    pub builder: Option<Box<dyn ImageBuilder>>,
    pub executed: Vec<Phase>,
    pub warnings: Vec<PhaseWarning>,
}

impl<C> BuildSession<C> {
    pub fn new(request: BuildRequest) -> Self {
        Self {
            request,
            client: None,
            image: None,
            run_dirs: None,
            container: None,
            armed: None,
            probe: None,
            target_tag: None,
            builder: None,
            executed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn client(&self) -> Result<&C> {
        self.client.as_ref().ok_or_else(|| missing("Docker client"))
    }

    pub fn image(&self) -> Result<&dyn ImageInspector> {
        self.image
            .as_deref()
            .ok_or_else(|| missing("image inspector"))
    }

    pub fn image_mut(&mut self) -> Result<&mut (dyn ImageInspector + 'static)> {
        self.image
            .as_deref_mut()
            .ok_or_else(|| missing("image inspector"))
    }

    pub fn image_info(&self) -> Result<&ImageInfo> {
        self.image()?
            .image_info()
            .ok_or_else(|| missing("image metadata"))
    }

    pub fn run_dirs(&self) -> Result<&RunDirs> {
        self.run_dirs.as_ref().ok_or_else(|| missing("run directories"))
    }

    pub fn container(&self) -> Result<&dyn ContainerInspector> {
        self.container
            .as_deref()
            .ok_or_else(|| missing("container inspector"))
    }

    pub fn container_mut(&mut self) -> Result<&mut (dyn ContainerInspector + 'static)> {
        self.container
            .as_deref_mut()
            .ok_or_else(|| missing("container inspector"))
    }

    pub fn builder(&self) -> Result<&dyn ImageBuilder> {
        self.builder
            .as_deref()
            .ok_or_else(|| missing("image builder"))
    }
}

fn missing(what: &str) -> anyhow::Error {
    anyhow!("Phase ordering violated: {} is not available yet", what)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_session_rejects_early_access() {
        let session: BuildSession<()> = BuildSession::new(BuildRequest::new("app", "/tmp"));
        assert!(session.client().is_err());
        assert!(session.image().is_err());
        assert!(session.run_dirs().is_err());
        let err = session.container().err().unwrap();
        assert!(err.to_string().contains("container inspector"));
    }

    #[test]
    fn test_session_keeps_request() {
        let session: BuildSession<()> =
            BuildSession::new(BuildRequest::new("nginx:latest", "/tmp/state"));
        assert_eq!(session.request.image_ref, "nginx:latest");
        assert!(session.executed.is_empty());
        assert!(session.warnings.is_empty());
    }
}
