use slimbox::cli::commands::{CliArgs, Commands};
use slimbox::cli::handlers::{handle_build, handle_version};
use slimbox::util::{init_logging, LoggingConfig};
use slimbox::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("slimbox v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Build(build_args) => handle_build(build_args, args.debug, args.quiet).await,
        Commands::Version(version_args) => handle_version(version_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let config = LoggingConfig::from_cli(
        args.log_level.as_deref(),
        args.verbose || args.debug,
        args.quiet,
    );
    init_logging(config);
}
