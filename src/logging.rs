//! Combined terminal + file logging, mirroring the teacher's
//! `src-tauri/src/log.rs::setup_logger`.
//!
//! The engine never calls this on its own — an embedding application calls
//! it once at process start if it wants the engine's `log` records to go
//! somewhere. Library code only ever calls `log::info!`/`log::warn!`/etc;
//! it never installs a global logger behind the caller's back.

use std::fs::{create_dir_all, File};
use std::path::Path;

use anyhow::{Context, Result};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Install a combined terminal (info+) and rotating-file (debug+) logger.
///
/// `log_dir` is created if it doesn't exist; a single `engine.log` file is
/// written there. Unlike the teacher's split frontend/backend log files,
/// there is no embedded frontend here, so one file sink suffices.
pub fn init_logging(log_dir: &Path) -> Result<()> {
    create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {:?}", log_dir))?;

    let log_file = File::create(log_dir.join("engine.log"))
        .context("creating engine.log")?;

    let file_config = ConfigBuilder::new()
        .set_time_offset_to_local()
        .unwrap_or_else(|b| b)
        .build();

    let term_config = ConfigBuilder::new()
        .set_time_offset_to_local()
        .unwrap_or_else(|b| b)
        .build();

    let loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(
            LevelFilter::Info,
            term_config,
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(LevelFilter::Debug, file_config, log_file),
    ];

    CombinedLogger::init(loggers).ok();
    log::info!("etherlink-core logging initialized");
    Ok(())
}
