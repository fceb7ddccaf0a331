pub mod commands;
pub mod handlers;
pub mod output;
pub mod signals;

pub use commands::{BuildArgs, CliArgs, Commands, ContinueAfterArg, OutputFormatArg, VersionArgs};
pub use handlers::{build_request, handle_build, handle_version};
pub use output::{OutputFormat, OutputFormatter, VersionInfo};
