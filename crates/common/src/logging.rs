//! Logging configuration for labflow components
//!
//! Provides centralized logging setup with:
//! - Colorful console output with structured formatting
//! - File logging to a temporary directory with daily rotation
//! - Environment variable support (RUST_LOG)
//! - Default INFO level

use eyre::Result;
use std::{env, fs, path::PathBuf, sync::Once};
use tracing::Level;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Initialize logging for a labflow component.
///
/// * `component_name` - name of the component (e.g. `"labflow"`, `"labflow-bridge"`)
/// * `enable_file_logging` - whether to additionally log to a daily-rotating file
pub fn init_logging(component_name: &str, enable_file_logging: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .expect("failed to build environment filter");

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(true)
        .pretty();

    if enable_file_logging {
        let log_dir = create_log_directory(component_name)?;

        let file_appender = rolling::daily(&log_dir, format!("{component_name}.log"));
        let (non_blocking_appender, guard) = non_blocking(file_appender);
        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_timer(LocalTime::rfc_3339())
            .with_ansi(false)
            .with_writer(non_blocking_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer.with_filter(filter_for_console()))
            .with(file_layer.with_filter(filter_for_file()))
            .try_init()
            .map_err(|e| eyre::eyre!("failed to initialize tracing subscriber: {e}"))?;

        tracing::info!(
            component = component_name,
            log_dir = %log_dir.display(),
            "logging initialized with console and file output"
        );
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .try_init()
            .map_err(|e| eyre::eyre!("failed to initialize tracing subscriber: {e}"))?;

        tracing::info!(component = component_name, "logging initialized with console output only");
    }

    Ok(())
}

fn create_log_directory(component_name: &str) -> Result<PathBuf> {
    let log_dir = env::temp_dir().join("labflow-logs").join(component_name);
    fs::create_dir_all(&log_dir)?;
    Ok(log_dir)
}

fn filter_for_console() -> EnvFilter {
    EnvFilter::from_default_env()
        .add_directive("tower_http=warn".parse().unwrap())
        .add_directive("hyper=warn".parse().unwrap())
}

fn filter_for_file() -> EnvFilter {
    EnvFilter::from_default_env()
}

/// Initialize plain console-only logging, for small utilities and tests.
pub fn init_simple_logging(level: Level) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .expect("failed to build environment filter");

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre::eyre!("failed to initialize simple logging: {e}"))?;

    Ok(())
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Idempotent logging init for tests; safe to call from any test, any number of times.
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        let default_level = default_level.unwrap_or(Level::INFO);
        let _ = init_simple_logging(default_level);
    });
}
