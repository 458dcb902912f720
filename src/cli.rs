//! Command line front-end.
//!
//! ```text
//! <binary> --mode selfplay --model=/models/000123.pb --parallel_games=16 --output_dir=/data
//! ```
//!
//! The crate does not ship the search agent or the inference backend, so the binary
//! embedding them calls [`run`] with its [`Collaborators`].

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, Level};

use crate::configuration::Configuration;
use crate::flags::Flags;
use crate::logger::init_stderr_logger;
use crate::orchestrator::{Collaborators, Mode, ModeReport, Orchestrator};

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about = "Runs self-play, evaluation, GTP and puzzle jobs")]
pub struct Cli {
    /// Mode to run.
    #[arg(long, value_enum)]
    pub mode: Mode,

    #[command(flatten)]
    pub flags: Flags,
}

/// Parse the process arguments and environment, run the mode and turn the outcome into
/// an exit code.
pub fn run(collaborators: Collaborators) -> ExitCode {
    let cli = Cli::parse();
    let config = Configuration::from_env();
    if !config.log {
        if let Err(e) = init_stderr_logger(Level::INFO) {
            eprintln!("{e:#}");
        }
    }

    match run_with(&cli, collaborators, config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run an already parsed command line.
pub fn run_with(
    cli: &Cli,
    collaborators: Collaborators,
    config: Configuration,
) -> anyhow::Result<ModeReport> {
    Orchestrator::new(collaborators, config)?.run(cli.mode, &cli.flags)
}
