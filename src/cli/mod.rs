//! Administrative command line
//!
//! - inspect: scan the log and report the recovered state
//! - rotate: force a log rotation

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{inspect, rotate, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
