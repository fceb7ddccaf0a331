use crate::pipeline::request::{HttpProbeCmd, ImageOverrides, VolumeMount};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Minifies container images by watching what a running container touches
#[derive(Parser, Debug)]
#[command(
    name = "slimbox",
    about = "Minify container images by observing a running container",
    version,
    author,
    long_about = "slimbox runs an instrumented copy of an image, records which files the \
                  container uses while you (or the HTTP probe) exercise it, and builds a \
                  minimized image that only carries those files."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        help = "Debug mode: debug logging and verbose in-container monitoring"
    )]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build a minimized image",
        long_about = "Inspects IMAGE, runs it instrumented, waits for the continue-after \
                      condition, then builds a minimized image from the files it used.\n\n\
                      Examples:\n  \
                      slimbox build nginx:latest\n  \
                      slimbox build --http-probe my/app:1.0\n  \
                      slimbox build --continue-after timeout --continue-after-timeout 30 redis\n  \
                      slimbox build --tag my/app:slim --format json my/app:1.0"
    )]
    Build(BuildArgs),

    #[command(about = "Show slimbox and Docker daemon versions")]
    Version(VersionArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "IMAGE", help = "Image to minify (name, name:tag or ID)")]
    pub image: String,

    #[arg(
        short = 't',
        long,
        value_name = "TAG",
        help = "Tag for the minimized image (default: <repo>.slim)"
    )]
    pub tag: Option<String>,

    #[arg(long, help = "Exercise the container with HTTP requests (forces --continue-after probe)")]
    pub http_probe: bool,

    #[arg(
        long = "http-probe-cmd",
        value_name = "[PROTO:][METHOD:]RESOURCE",
        help = "HTTP probe request, repeatable (default: GET /)"
    )]
    pub http_probe_cmds: Vec<HttpProbeCmd>,

    #[arg(
        long,
        value_enum,
        default_value = "enter",
        help = "When to stop observing the container"
    )]
    pub continue_after: ContinueAfterArg,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Wait for --continue-after timeout (default: SLIMBOX_CONTINUE_AFTER_TIMEOUT or 60)"
    )]
    pub continue_after_timeout: Option<u64>,

    #[arg(long, help = "Remove the collected artifacts after the build")]
    pub remove_file_artifacts: bool,

    #[arg(long = "show-clogs", help = "Print the container logs on shutdown")]
    pub show_container_logs: bool,

    #[arg(
        long,
        value_name = "CMD",
        conflicts_with = "clear_entrypoint",
        help = "Override ENTRYPOINT (JSON array or space-separated)"
    )]
    pub entrypoint: Option<String>,

    #[arg(long, help = "Run the container with an empty ENTRYPOINT")]
    pub clear_entrypoint: bool,

    #[arg(
        long,
        value_name = "CMD",
        conflicts_with = "clear_cmd",
        help = "Override CMD (JSON array or space-separated)"
    )]
    pub cmd: Option<String>,

    #[arg(long, help = "Run the container with an empty CMD")]
    pub clear_cmd: bool,

    #[arg(short = 'w', long, value_name = "DIR", help = "Override WORKDIR")]
    pub workdir: Option<String>,

    #[arg(
        short = 'e',
        long,
        value_name = "KEY=VALUE",
        help = "Add or override an environment variable, repeatable"
    )]
    pub env: Vec<String>,

    #[arg(long, value_name = "PORT[/PROTO]", help = "Expose an extra port, repeatable")]
    pub expose: Vec<String>,

    #[arg(
        long,
        value_name = "LIST",
        help = "Container overrides to keep in the image: comma list of entrypoint,cmd,workdir,env,expose or 'all'"
    )]
    pub image_overrides: Option<ImageOverrides>,

    #[arg(
        long = "mount",
        value_name = "SRC:DST[:ro]",
        help = "Mount a host path into the container, repeatable"
    )]
    pub mounts: Vec<VolumeMount>,

    #[arg(long = "exclude-path", value_name = "PATH", help = "Never keep files under PATH, repeatable")]
    pub exclude_paths: Vec<String>,

    #[arg(long = "include-path", value_name = "PATH", help = "Always keep PATH, repeatable")]
    pub include_paths: Vec<String>,

    #[arg(
        long,
        value_name = "DIR",
        help = "State directory (default: SLIMBOX_STATE_PATH or the platform data dir)"
    )]
    pub state_path: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct VersionArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueAfterArg {
    Enter,
    Signal,
    Timeout,
    Probe,
}

impl ContinueAfterArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContinueAfterArg::Enter => "enter",
            ContinueAfterArg::Signal => "signal",
            ContinueAfterArg::Timeout => "timeout",
            ContinueAfterArg::Probe => "probe",
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}
