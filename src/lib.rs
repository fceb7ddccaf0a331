//! slimbox - minify container images by watching them run
//!
//! This library drives the workflow that turns a "fat" container image into a
//! minimized one. The image is inspected, an instrumented container is started
//! from it, the caller decides when observation is over, and a new image is
//! built from the files the container actually touched.
//!
//! # Core Concepts
//!
//! - **Build pipeline**: a fixed table of phases executed in order by
//!   [`BuildOrchestrator`]. Each phase is either fatal (aborts the run) or
//!   recoverable (logged, the run continues).
//! - **Continue-after**: how the pipeline decides the observation window is
//!   over - interactive `<enter>`, an external signal, a timeout, or an HTTP
//!   probe finishing its command list.
//! - **Toolkit**: the collaborators the pipeline drives (image inspector,
//!   container inspector, HTTP probe, image builder). [`DockerToolkit`] talks to
//!   a real Docker daemon; tests plug in their own.
//!
//! # Example Usage
//!
//! ```no_run
//! use slimbox::{BuildOrchestrator, BuildRequest, DockerToolkit, LoggingHandler};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let request = BuildRequest::new("nginx:latest", "/tmp/slimbox-state");
//! let orchestrator = BuildOrchestrator::new(DockerToolkit::new())
//!     .with_progress(Arc::new(LoggingHandler));
//!
//! let report = orchestrator.run(request).await?;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`pipeline`]: request types, phase table, session state and the orchestrator
//! - [`toolkit`]: collaborator traits consumed by the pipeline
//! - [`docker`]: Docker-backed collaborators built on `bollard`
//! - [`probe`]: HTTP probe that exercises the running container
//! - [`cli`]: command-line arguments, handlers and output formatting

pub mod cli;
pub mod config;
pub mod docker;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod toolkit;
pub mod util;

pub use config::{ConfigError, SlimboxConfig};
pub use docker::DockerToolkit;
pub use pipeline::{
    completion, ArmedWait, BuildError, BuildOrchestrator, BuildOutcome, BuildReport,
    BuildRequest, Completion, CompletionSignal, ContinueAfter, Phase, Severity, PHASES,
};
pub use progress::{LoggingHandler, NoOpHandler, ProgressEvent, ProgressHandler};
pub use toolkit::{ContainerInspector, HttpProbe, ImageBuilder, ImageInfo, ImageInspector, Toolkit};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
