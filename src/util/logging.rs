//! Structured logging setup for slimbox
//!
//! Logs always go to stderr so that `--format json` and `--format yaml` reports
//! on stdout stay machine readable.
//!
//! # Example
//!
//! ```no_run
//! use slimbox::util::logging;
//! use tracing::info;
//!
//! logging::init_from_env();
//! info!("Application started");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Noisy dependencies capped at `warn` unless `RUST_LOG` says otherwise
const QUIET_TARGETS: [&str; 4] = ["bollard", "hyper", "h2", "reqwest"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for the `slimbox` target
    pub level: Level,

    /// Emit one JSON object per event instead of console lines
    pub use_json: bool,

    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Resolves the level from the global CLI flags.
    ///
    /// An explicit `--log-level` wins, then `-v`/`--debug`, then `-q`, then
    /// `SLIMBOX_LOG_LEVEL`. `SLIMBOX_LOG_JSON` picks the output format.
    pub fn from_cli(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = if let Some(level_str) = log_level {
            parse_level(level_str)
        } else if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            level_from_env()
        };

        Self {
            level,
            use_json: json_from_env(),
            include_location: level == Level::TRACE,
            ..Default::default()
        }
    }
}

/// Parses a log level, case-insensitively. Unknown values fall back to INFO.
///
/// ```
/// use slimbox::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("bogus"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Installs the global subscriber. Only the first call has any effect.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = build_filter(&config);

        if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Initializes logging from `SLIMBOX_LOG_LEVEL`, `SLIMBOX_LOG_JSON` and `RUST_LOG`
pub fn init_from_env() {
    init_logging(LoggingConfig {
        level: level_from_env(),
        use_json: json_from_env(),
        ..Default::default()
    });
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::from_default_env();

    if let Some(directive) = directive(&format!("slimbox={}", config.level)) {
        filter = filter.add_directive(directive);
    }

    if env::var("RUST_LOG").is_err() {
        for target in QUIET_TARGETS {
            if let Some(directive) = directive(&format!("{}=warn", target)) {
                filter = filter.add_directive(directive);
            }
        }
    }

    filter
}

fn directive(spec: &str) -> Option<Directive> {
    match spec.parse() {
        Ok(directive) => Some(directive),
        Err(e) => {
            eprintln!("Ignoring log directive '{}': {}", spec, e);
            None
        }
    }
}

fn level_from_env() -> Level {
    env::var("SLIMBOX_LOG_LEVEL")
        .map(|s| parse_level(&s))
        .unwrap_or(Level::INFO)
}

fn json_from_env() -> bool {
    env::var("SLIMBOX_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_case_insensitive() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("invalid"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(config.include_target);
        assert!(!config.include_location);
    }

    #[test]
    #[serial]
    fn test_from_cli_precedence() {
        env::set_var("SLIMBOX_LOG_LEVEL", "warn");

        assert_eq!(
            LoggingConfig::from_cli(Some("trace"), true, false).level,
            Level::TRACE
        );
        assert_eq!(LoggingConfig::from_cli(None, true, false).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_cli(None, false, true).level, Level::ERROR);
        assert_eq!(LoggingConfig::from_cli(None, false, false).level, Level::WARN);

        env::remove_var("SLIMBOX_LOG_LEVEL");
        assert_eq!(LoggingConfig::from_cli(None, false, false).level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_json_from_env() {
        env::set_var("SLIMBOX_LOG_JSON", "true");
        assert!(LoggingConfig::from_cli(None, false, false).use_json);

        env::set_var("SLIMBOX_LOG_JSON", "nope");
        assert!(!LoggingConfig::from_cli(None, false, false).use_json);

        env::remove_var("SLIMBOX_LOG_JSON");
    }

    #[test]
    fn test_directive_rejects_garbage() {
        assert!(directive("slimbox=debug").is_some());
        assert!(directive("slimbox=loudest").is_none());
    }
}
