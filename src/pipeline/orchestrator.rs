use super::completion::CompletionSignal;
use super::continue_after::{ArmedWait, ContinueAfter};
use super::error::BuildError;
use super::outcome::{BuildOutcome, BuildReport, PhaseWarning};
use super::phase::{Phase, Severity, PHASES};
use super::request::BuildRequest;
use super::session::BuildSession;
use super::storage::{prepare_run_dirs, remove_artifacts};
use crate::progress::{ProgressEvent, ProgressHandler};
use crate::toolkit::{BuilderSpec, ContainerSpec, Toolkit};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use indicatif::HumanBytes;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type InputStream = Box<dyn AsyncBufRead + Unpin + Send>;

/// What the driver does after a phase returned successfully
#[derive(Debug)]
enum PhaseFlow {
    Continue,
    Finish(BuildOutcome),
}

/// Runs the build pipeline phase by phase
pub struct BuildOrchestrator<T: Toolkit> {
    toolkit: T,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
    input: Mutex<InputStream>,
    signal_source: Mutex<Option<CompletionSignal>>,
}

impl<T: Toolkit> BuildOrchestrator<T> {
    /// Creates an orchestrator that reads `enter` confirmations from stdin
    pub fn new(toolkit: T) -> Self {
        Self {
            toolkit,
            progress_handler: None,
            input: Mutex::new(Box::new(BufReader::new(tokio::io::stdin()))),
            signal_source: Mutex::new(None),
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress_handler = Some(handler);
        self
    }

    /// Replaces stdin as the source of the `enter` confirmation
    pub fn with_input(mut self, input: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        self.input = Mutex::new(Box::new(input));
        self
    }

    /// Completion fed by an external signal listener, consumed by `signal` mode
    pub fn with_signal_source(mut self, signal: CompletionSignal) -> Self {
        self.signal_source = Mutex::new(Some(signal));
        self
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    /// Executes every phase of [`PHASES`] in order.
    ///
    /// A fatal phase failure stops the run and is returned as an error. A
    /// recoverable failure is logged, recorded in the report and skipped past.
    pub async fn run(&self, request: BuildRequest) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let started_at = Utc::now();
        let image = request.image_ref.clone();

        info!("Starting build pipeline for: {}", image);
        self.emit(ProgressEvent::Started {
            image: image.clone(),
        });

        let mut session: BuildSession<T::Client> = BuildSession::new(request);

        for descriptor in PHASES.iter() {
            let phase = descriptor.phase;
            self.emit(ProgressEvent::PhaseStarted { phase });
            session.executed.push(phase);

            let phase_start = Instant::now();
            match self.execute_phase(phase, &mut session).await {
                Ok(flow) => {
                    self.emit(ProgressEvent::PhaseComplete {
                        phase,
                        duration: phase_start.elapsed(),
                    });
                    debug!("Phase {} complete", phase);

                    if let PhaseFlow::Finish(outcome) = flow {
                        let total_time = start.elapsed();
                        self.emit(ProgressEvent::Completed {
                            outcome: outcome_label(&outcome).to_string(),
                            total_time,
                        });
                        return Ok(BuildReport {
                            image,
                            outcome,
                            phases: session.executed,
                            warnings: session.warnings,
                            started_at,
                            duration_ms: total_time.as_millis() as u64,
                        });
                    }
                }
                Err(err) => match descriptor.severity {
                    Severity::Fatal => {
                        self.emit(ProgressEvent::Failed {
                            phase,
                            error: format!("{:#}", err),
                        });
                        return Err(BuildError::PhaseFailed { phase, source: err });
                    }
                    Severity::Warn => {
                        let warning = PhaseWarning::new(phase, &err);
                        warn!("Phase {} failed, continuing: {}", phase, warning.message);
                        self.emit(ProgressEvent::PhaseWarning {
                            phase,
                            error: warning.message.clone(),
                        });
                        session.warnings.push(warning);
                    }
                },
            }
        }

        Err(BuildError::PhaseFailed {
            phase: Phase::Report,
            source: anyhow!("Pipeline ended without a terminal outcome"),
        })
    }

    async fn execute_phase(
        &self,
        phase: Phase,
        session: &mut BuildSession<T::Client>,
    ) -> Result<PhaseFlow> {
        match phase {
            Phase::Connect => self.connect(session).await,
            Phase::Resolve => self.resolve(session).await,
            Phase::Inspect => self.inspect(session).await,
            Phase::PrepareStorage => self.prepare_storage(session),
            Phase::ProcessImageData => self.process_image_data(session).await,
            Phase::LaunchContainer => self.launch_container(session).await,
            Phase::ArmContinueAfter => self.arm_continue_after(session).await,
            Phase::Wait => self.wait(session).await,
            Phase::FinishMonitoring => self.finish_monitoring(session).await,
            Phase::ShutdownContainer => self.shutdown_container(session).await,
            Phase::DataPresenceGate => self.data_presence_gate(session),
            Phase::ProcessContainerData => self.process_container_data(session).await,
            Phase::ResolveTargetTag => self.resolve_target_tag(session),
            Phase::Build => self.build(session).await,
            Phase::Cleanup => self.cleanup(session),
            Phase::Report => self.report(session),
        }
    }

    async fn connect(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let client = self
            .toolkit
            .connect(&session.request.docker)
            .await
            .context("Failed to connect to the Docker daemon")?;
        session.client = Some(client);
        Ok(PhaseFlow::Continue)
    }

    async fn resolve(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let image_ref = session.request.image_ref.clone();
        let inspector = self
            .toolkit
            .image_inspector(session.client()?, &image_ref)
            .await
            .with_context(|| format!("Failed to resolve image {}", image_ref))?;

        if !inspector.image_exists() {
            info!("Target image not found - {}", image_ref);
            return Ok(PhaseFlow::Finish(BuildOutcome::ImageNotFound { image: image_ref }));
        }

        session.image = Some(inspector);
        Ok(PhaseFlow::Continue)
    }

    async fn inspect(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        info!("Inspecting 'fat' image metadata...");
        session
            .image_mut()?
            .inspect()
            .await
            .context("Failed to inspect image")?;
        Ok(PhaseFlow::Continue)
    }

    fn prepare_storage(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let info = session.image_info()?.clone();
        let dirs = prepare_run_dirs(&session.request.state_path, &info.id)?;
        session
            .image_mut()?
            .set_artifact_location(dirs.artifact_location.clone());
        session.run_dirs = Some(dirs);

        info!(
            "[{}] 'fat' image size => {} ({})",
            info.id,
            info.virtual_size,
            HumanBytes(info.virtual_size.max(0) as u64)
        );
        Ok(PhaseFlow::Continue)
    }

    async fn process_image_data(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        info!("Processing 'fat' image info...");
        session
            .image_mut()?
            .process_collected_data()
            .await
            .context("Failed to process image data")?;
        Ok(PhaseFlow::Continue)
    }

    async fn launch_container(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let request = &session.request;
        let dirs = session.run_dirs()?;
        let spec = ContainerSpec {
            image: session.image_info()?.clone(),
            local_volume_path: dirs.local_volume_path.clone(),
            artifact_location: dirs.artifact_location.clone(),
            overrides: request.overrides.clone(),
            show_logs: request.show_container_logs,
            volume_mounts: request.volume_mounts.clone(),
            exclude_paths: request.exclude_paths.clone(),
            include_paths: request.include_paths.clone(),
            debug: request.debug,
        };

        let container = self
            .toolkit
            .container_inspector(session.client()?, spec)
            .context("Failed to create container inspector")?;
        session.container = Some(container);

        info!("Starting instrumented 'fat' container...");
        session
            .container_mut()?
            .run_container()
            .await
            .context("Failed to start instrumented container")?;
        Ok(PhaseFlow::Continue)
    }

    async fn arm_continue_after(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let requested = session.request.continue_after;
        let mode = requested.resolve(session.request.http_probe);
        if mode != requested {
            info!(
                requested = %requested,
                "HTTP probing requested, continue-after forced to probe"
            );
        }

        let armed = match mode {
            ContinueAfter::Enter => ArmedWait::Enter,
            ContinueAfter::Timeout(duration) => ArmedWait::Timeout(duration),
            ContinueAfter::Signal => {
                let signal = self
                    .signal_source
                    .lock()
                    .await
                    .take()
                    .ok_or_else(|| anyhow!("continue-after 'signal' needs a signal source"))?;
                ArmedWait::Signal(signal)
            }
            ContinueAfter::Probe => {
                let commands = session.request.effective_probe_cmds();
                let mut probe = self
                    .toolkit
                    .http_probe(session.container()?, &commands)
                    .context("Failed to create HTTP probe")?;
                probe.start();
                let signal = probe
                    .done_signal()
                    .ok_or_else(|| anyhow!("HTTP probe has no completion signal"))?;
                session.probe = Some(probe);
                ArmedWait::Probe(signal)
            }
        };

        session.armed = Some(armed);
        Ok(PhaseFlow::Continue)
    }

    async fn wait(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let armed = session
            .armed
            .take()
            .ok_or_else(|| anyhow!("Phase ordering violated: continue-after is not armed"))?;

        self.emit(ProgressEvent::WaitStarted {
            mode: armed.mode_name(),
        });
        let mut input = self.input.lock().await;
        armed.wait(&mut *input).await;
        Ok(PhaseFlow::Continue)
    }

    async fn finish_monitoring(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        session.container_mut()?.finish_monitoring().await;
        Ok(PhaseFlow::Continue)
    }

    async fn shutdown_container(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        info!("Shutting down 'fat' container...");
        session
            .container_mut()?
            .shutdown_container()
            .await
            .context("Failed to shut down instrumented container")?;
        Ok(PhaseFlow::Continue)
    }

    fn data_presence_gate(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        if session.container()?.has_collected_data() {
            return Ok(PhaseFlow::Continue);
        }

        let image_id = session.image_info()?.id.clone();
        let instructions = session.image()?.fat_image_instructions();
        info!("No data collected (no minified image generated)");
        Ok(PhaseFlow::Finish(BuildOutcome::NoDataCollected {
            image_id,
            instructions,
        }))
    }

    async fn process_container_data(
        &self,
        session: &mut BuildSession<T::Client>,
    ) -> Result<PhaseFlow> {
        info!("Processing instrumented 'fat' container info...");
        session
            .container_mut()?
            .process_collected_data()
            .await
            .context("Failed to process container data")?;
        Ok(PhaseFlow::Continue)
    }

    fn resolve_target_tag(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let tag = match session.request.custom_tag.as_deref() {
            Some(tag) if !tag.trim().is_empty() => tag.to_string(),
            _ => session.image()?.slim_image_repo(),
        };
        debug!(tag = %tag, "Resolved target tag");
        session.target_tag = Some(tag);
        Ok(PhaseFlow::Continue)
    }

    async fn build(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        info!("Building 'slim' image...");
        let spec = BuilderSpec {
            target_tag: session
                .target_tag
                .clone()
                .ok_or_else(|| anyhow!("Phase ordering violated: target tag is not resolved"))?,
            image: session.image_info()?.clone(),
            artifact_location: session.run_dirs()?.artifact_location.clone(),
            image_overrides: session.request.image_overrides,
            overrides: session.request.overrides.clone(),
        };

        let mut builder = self
            .toolkit
            .image_builder(session.client()?, spec)
            .context("Failed to create image builder")?;

        if !builder.has_data() {
            warn!("No data artifacts, the image will only carry its configuration");
        }

        builder.build().await.context("Failed to build image")?;
        info!(
            "Created new image: {} (has data artifacts: {})",
            builder.repo_name(),
            builder.has_data()
        );
        session.builder = Some(builder);
        Ok(PhaseFlow::Continue)
    }

    fn cleanup(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        if !session.request.remove_file_artifacts {
            return Ok(PhaseFlow::Continue);
        }

        info!("Removing temporary artifacts...");
        // TODO: remove only the "files" subtree once nothing else reads the rest
        remove_artifacts(&session.run_dirs()?.artifact_location)?;
        Ok(PhaseFlow::Continue)
    }

    fn report(&self, session: &mut BuildSession<T::Client>) -> Result<PhaseFlow> {
        let builder = session.builder()?;
        info!("Build done");
        Ok(PhaseFlow::Finish(BuildOutcome::Built {
            repo_name: builder.repo_name().to_string(),
            has_data: builder.has_data(),
        }))
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress_handler {
            handler.on_progress(&event);
        }
    }
}

fn outcome_label(outcome: &BuildOutcome) -> &'static str {
    match outcome {
        BuildOutcome::ImageNotFound { .. } => "image_not_found",
        BuildOutcome::NoDataCollected { .. } => "no_data_collected",
        BuildOutcome::Built { .. } => "built",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::LoggingHandler;

    struct NeverConnects;

    #[async_trait::async_trait]
    impl Toolkit for NeverConnects {
        type Client = ();

        async fn connect(
            &self,
            _config: &crate::pipeline::request::DockerClientConfig,
        ) -> Result<()> {
            Err(anyhow!("connection refused"))
        }

        async fn image_inspector(
            &self,
            _client: &(),
            _image_ref: &str,
        ) -> Result<Box<dyn crate::toolkit::ImageInspector>> {
            unreachable!("connect always fails")
        }

        fn container_inspector(
            &self,
            _client: &(),
            _spec: ContainerSpec,
        ) -> Result<Box<dyn crate::toolkit::ContainerInspector>> {
            unreachable!("connect always fails")
        }

        fn http_probe(
            &self,
            _container: &dyn crate::toolkit::ContainerInspector,
            _commands: &[crate::pipeline::request::HttpProbeCmd],
        ) -> Result<Box<dyn crate::toolkit::HttpProbe>> {
            unreachable!("connect always fails")
        }

        fn image_builder(
            &self,
            _client: &(),
            _spec: BuilderSpec,
        ) -> Result<Box<dyn crate::toolkit::ImageBuilder>> {
            unreachable!("connect always fails")
        }
    }

    #[tokio::test]
    async fn test_orchestrator_creation() {
        let orchestrator = BuildOrchestrator::new(NeverConnects);
        assert!(orchestrator.progress_handler.is_none());
    }

    #[tokio::test]
    async fn test_orchestrator_with_progress() {
        let orchestrator =
            BuildOrchestrator::new(NeverConnects).with_progress(Arc::new(LoggingHandler));
        assert!(orchestrator.progress_handler.is_some());
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let orchestrator = BuildOrchestrator::new(NeverConnects);
        let err = orchestrator
            .run(BuildRequest::new("nginx:latest", "/tmp/slimbox-test"))
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Connect);
        assert!(format!("{:#}", err).contains("connection refused"));
    }
}
