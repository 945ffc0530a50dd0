use std::path::PathBuf;

use anyhow::Context;
use sysinfo::System;

use target_scorer::config::Config;

const LOG_TARGET_STARTUP: &str = "target_scorer::startup";

/// Initialize tracing with file rotation
///
/// Logs are written to:
/// - Linux: ~/.config/TargetScorer/logs/
/// - macOS: ~/Library/Application Support/TargetScorer/logs/
/// - Windows: %APPDATA%/TargetScorer/logs/
///
/// Log rotation:
/// - Daily rotation (new file each day)
/// - Files named: target-scorer.log.YYYY-MM-DD
///
/// Log output:
/// - Debug builds: Console + File
/// - Release builds: File only
fn initialize_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = dirs::config_dir()
        .map(|dir| dir.join("TargetScorer").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let (file_writer, guard) = tracing_appender::non_blocking(rolling::daily(&log_dir, "target-scorer.log"));

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    #[cfg(debug_assertions)]
    {
        let console_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(console_layer)
            .init();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!("Log directory: {}", log_dir.display());
    guard
}

fn log_runtime_environment() {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting Target Scorer v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "CPUs: {}, memory: {} MiB",
        system.cpus().len(),
        system.total_memory() / (1024 * 1024)
    );
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "Rayon worker threads: {}",
        rayon::current_num_threads()
    );
}

fn main() -> anyhow::Result<()> {
    let _log_guard = initialize_tracing();
    log_runtime_environment();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    if let Err(e) = target_scorer::app::run(config) {
        tracing::error!("Fatal: {:#}", e);
        return Err(e);
    }
    Ok(())
}
