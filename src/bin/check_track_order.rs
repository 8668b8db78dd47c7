//! Checks that `Track: N` markers in the append log are strictly ascending.
//!
//! Run with no arguments to check `output_files/batch_content.txt`. Prints a
//! report to stdout and exits with 1 if order issues or duplicate tracks were
//! found, 0 otherwise (including when the log is absent or has no tracks).
//!
//! The default `--log` path is relative to the current working directory, so
//! run from the repository root or pass `--log` (or `BATCH_SINK_LOG_PATH`)
//! when running from elsewhere. An absent file is reported as not found.

use std::path::PathBuf;
use std::process::ExitCode;

use batch_sink::checker::{CheckOutcome, check_log};
use batch_sink::config::DEFAULT_LOG_PATH;
use clap::Parser;

/// Track-order audit of the batch sink's append log.
#[derive(Parser, Debug)]
#[command(name = "check-track-order", version)]
struct Args {
    /// Log file to check
    #[arg(long, env = "BATCH_SINK_LOG_PATH", default_value = DEFAULT_LOG_PATH)]
    log: PathBuf,

    /// Print the report as JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let outcome = check_log(&args.log);

    match (&outcome, args.json) {
        (CheckOutcome::Report(report), true) => match serde_json::to_string_pretty(report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize report: {e}");
                return ExitCode::FAILURE;
            }
        },
        _ => print!("{outcome}"),
    }

    if outcome.has_inconsistencies() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
