//! CLI command implementations
//!
//! Both commands work on a stopped node. They open the log directly and
//! must not run while a state machine is appending to it.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::Config;
use crate::health::DatabaseHealth;
use crate::observability::MetricsRegistry;
use crate::recovery::scan_log;
use crate::txlog::{LogAppendEvent, LogRotation, LoggingRotationMonitor, TransactionLogFile};

use super::args::{Cli, Command};
use super::errors::CliResult;
use super::io::write_response;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Inspect { config } => inspect(&config),
        Command::Rotate { config } => rotate(&config),
    }
}

/// Print the state recovery would hand to the state machine
pub fn inspect(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    write_response(inspect_log(&config)?)
}

/// Force a rotation of the active segment
pub fn rotate(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    write_response(rotate_log(&config)?)
}

fn inspect_log(config: &Config) -> CliResult<Value> {
    let log_dir = config.log_dir();
    let state = scan_log(&log_dir)?;
    Ok(json!({
        "log_dir": log_dir.display().to_string(),
        "recovered_index": state.recovered_index(),
        "state": state,
    }))
}

fn rotate_log(config: &Config) -> CliResult<Value> {
    let log_file = Arc::new(TransactionLogFile::open(
        config.log_dir(),
        config.log_rotation_threshold_bytes,
        Arc::new(DatabaseHealth::new()),
    )?);
    let metrics = Arc::new(MetricsRegistry::new());
    let rotation = LogRotation::new(
        log_file,
        Arc::new(LoggingRotationMonitor::new(Arc::clone(&metrics))),
    );

    let mut event = LogAppendEvent::new();
    let rotated = rotation.rotate_log_file(&mut event)?;
    Ok(json!({
        "rotation": rotated,
        "metrics": metrics.snapshot(),
    }))
}
