//! Tracing setup for the `kaiwa` binary.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directive targets match by prefix, so this covers every `kaiwa_*` crate.
const DEFAULT_FILTER: &str = "kaiwa=info";

/// Installs a daily rolling file log under `logs_dir`, plus a stderr layer
/// when `verbose` is set.
///
/// The filter comes from `KAIWA_LOG`, then `RUST_LOG`, then the default.
/// Keep the returned guard alive until exit so buffered lines are flushed.
pub fn init(logs_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create {}", logs_dir.display()))?;

    let filter = EnvFilter::try_from_env("KAIWA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_appender = tracing_appender::rolling::daily(logs_dir, "kaiwa.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(file_writer);

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init();

    Ok(guard)
}
