//! txreplica CLI entry point
//!
//! Parses arguments, dispatches, and turns a failure into an error
//! response plus a non-zero exit. All work happens in `cli`.

use txreplica::cli;

fn main() {
    if let Err(e) = cli::run() {
        // stdout may be closed; the exit status still reports the failure
        let _ = cli::write_error(e.code_str(), e.message());
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
