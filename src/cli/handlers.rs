use super::commands::{BuildArgs, ContinueAfterArg, VersionArgs};
use super::output::{OutputFormat, OutputFormatter, VersionInfo};
use super::signals::spawn_continue_listener;
use crate::config::{ConfigError, SlimboxConfig};
use crate::docker::{docker_version, DockerToolkit};
use crate::pipeline::request::{parse_exec_form, ContainerOverrides};
use crate::pipeline::{BuildOrchestrator, BuildRequest, ContinueAfter};
use crate::progress::{LoggingHandler, NoOpHandler, ProgressHandler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

pub async fn handle_build(args: &BuildArgs, debug: bool, quiet: bool) -> i32 {
    let config = merged_config(args, SlimboxConfig::default());
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        return EXIT_USAGE;
    }
    debug!("{}", config);

    let request = match build_request(args, debug, &config) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_USAGE;
        }
    };

    let mode = request.continue_after.resolve(request.http_probe);
    if mode == ContinueAfter::Enter && !atty::is(atty::Stream::Stdin) {
        warn!("stdin is not a terminal; continue-after 'enter' will release at end of input");
    }

    let format: OutputFormat = args.format.into();
    let summary = format!("slimbox[build]: {}", request.summary());
    if format == OutputFormat::Human {
        println!("{}", summary);
    } else {
        eprintln!("{}", summary);
    }

    let progress: Arc<dyn ProgressHandler> = if quiet {
        Arc::new(NoOpHandler)
    } else {
        Arc::new(LoggingHandler)
    };
    let mut orchestrator = BuildOrchestrator::new(DockerToolkit::new()).with_progress(progress);

    if mode == ContinueAfter::Signal {
        match spawn_continue_listener() {
            Ok(signal) => orchestrator = orchestrator.with_signal_source(signal),
            Err(e) => warn!("{:#}", e),
        }
    }

    match orchestrator.run(request).await {
        Ok(report) => {
            let formatter = OutputFormatter::new(format);
            match formatter.format_report(&report) {
                Ok(output) => {
                    println!("{}", output);
                    EXIT_OK
                }
                Err(e) => {
                    error!("Failed to format report: {:#}", e);
                    EXIT_FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("{}", e.help_message());
            EXIT_FAILURE
        }
    }
}

pub async fn handle_version(args: &VersionArgs) -> i32 {
    let config = SlimboxConfig::default();

    let (docker, docker_error) = match docker_version(&config.docker_client_config()).await {
        Ok(version) => (Some(version), None),
        Err(e) => {
            debug!("Docker version lookup failed: {:#}", e);
            (None, Some(format!("{:#}", e)))
        }
    };

    let info = VersionInfo {
        slimbox: crate::VERSION.to_string(),
        docker,
        docker_error,
    };

    match OutputFormatter::new(args.format.into()).format_version(&info) {
        Ok(output) => {
            print!("{}", output);
            EXIT_OK
        }
        Err(e) => {
            error!("Failed to format version: {:#}", e);
            EXIT_FAILURE
        }
    }
}

/// Applies per-run flags on top of the environment configuration
pub fn merged_config(args: &BuildArgs, mut config: SlimboxConfig) -> SlimboxConfig {
    if let Some(state_path) = &args.state_path {
        config.state_path = state_path.clone();
    }
    if let Some(secs) = args.continue_after_timeout {
        config.continue_after_timeout_secs = secs;
    }
    config
}

/// Turns parsed arguments and environment configuration into a build request
pub fn build_request(
    args: &BuildArgs,
    debug: bool,
    config: &SlimboxConfig,
) -> Result<BuildRequest, ConfigError> {
    let timeout = match args.continue_after_timeout {
        Some(0) => {
            return Err(ConfigError::ValidationFailed(
                "--continue-after-timeout must be at least 1 second".to_string(),
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => config.continue_after_timeout(),
    };
    if args.continue_after_timeout.is_some() && args.continue_after != ContinueAfterArg::Timeout {
        warn!("--continue-after-timeout only applies to --continue-after timeout");
    }

    let state_path = args
        .state_path
        .clone()
        .unwrap_or_else(|| config.state_path.clone());

    let overrides = ContainerOverrides {
        entrypoint: args.entrypoint.as_deref().map(parse_exec_form).transpose()?,
        clear_entrypoint: args.clear_entrypoint,
        cmd: args.cmd.as_deref().map(parse_exec_form).transpose()?,
        clear_cmd: args.clear_cmd,
        workdir: args.workdir.clone().filter(|w| !w.is_empty()),
        env: args.env.clone(),
        exposed_ports: args.expose.clone(),
    };

    let mut request = BuildRequest::new(args.image.clone(), state_path);
    request.custom_tag = args.tag.clone().filter(|t| !t.trim().is_empty());
    request.debug = debug;
    request.docker = config.docker_client_config();
    request.overrides = overrides;
    request.image_overrides = args.image_overrides.unwrap_or_default();
    request.volume_mounts = args.mounts.clone();
    request.include_paths = args.include_paths.iter().cloned().collect();
    request.exclude_paths = args.exclude_paths.iter().cloned().collect();
    request.http_probe = args.http_probe || !args.http_probe_cmds.is_empty();
    if !args.http_probe && request.http_probe {
        debug!("--http-probe-cmd given, enabling HTTP probing");
    }
    request.http_probe_cmds = args.http_probe_cmds.clone();
    request.remove_file_artifacts = args.remove_file_artifacts;
    request.show_container_logs = args.show_container_logs;
    request.continue_after = ContinueAfter::parse(args.continue_after.as_str(), timeout)?;

    Ok(request)
}
