//! Logging Configuration
//!
//! stdout is the native messaging channel, so every log line goes to stderr.
//! Records emitted through the `log` facade by the core library are bridged
//! into the same subscriber.

use tracing_subscriber::EnvFilter;

/// Extra directives appended to the chosen level; HTTP internals stay quiet.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

pub fn parse_log_level(value: &str) -> Option<log::LevelFilter> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(log::LevelFilter::Trace),
        "debug" => Some(log::LevelFilter::Debug),
        "info" => Some(log::LevelFilter::Info),
        "warn" => Some(log::LevelFilter::Warn),
        "error" => Some(log::LevelFilter::Error),
        "off" => Some(log::LevelFilter::Off),
        _ => None,
    }
}

pub fn level_to_str(level: log::LevelFilter) -> &'static str {
    match level {
        log::LevelFilter::Trace => "trace",
        log::LevelFilter::Debug => "debug",
        log::LevelFilter::Info => "info",
        log::LevelFilter::Warn => "warn",
        log::LevelFilter::Error => "error",
        log::LevelFilter::Off => "off",
    }
}

fn resolve_level(configured: &str) -> log::LevelFilter {
    parse_log_level(configured).unwrap_or_else(|| {
        eprintln!(
            "Warning: Invalid log level '{}', falling back to info",
            configured
        );
        log::LevelFilter::Info
    })
}

fn filter_directives(level: log::LevelFilter) -> String {
    match level {
        log::LevelFilter::Off => "off".to_string(),
        level => format!("{},{}", level_to_str(level), QUIET_DEPENDENCIES),
    }
}

/// Installs the global subscriber. Returns the effective level.
pub fn init_logging(configured: &str) -> anyhow::Result<log::LevelFilter> {
    let level = resolve_level(configured);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter_directives(level)))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(level)
}
