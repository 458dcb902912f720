//! Mode dispatch.
//!
//! An [`Orchestrator`] owns the external [`Collaborators`] (model loading, the search
//! agent, example and game record storage) and runs one of the four modes per call to
//! [`Orchestrator::run`]:
//!
//! - [`Mode::Selfplay`]: [`SelfPlayer`] worker pool
//! - [`Mode::Eval`]: [`PairEvaluator`] with `--model_two`, [`GtpEvaluator`] with
//!   `--gtp_client` (exactly one of the two must be given)
//! - [`Mode::Gtp`]: [`GtpServer`] on stdin/stdout
//! - [`Mode::Puzzle`]: [`PuzzleSolver`] over `--sgf_dir`
//!
//! # Example
//!
//! See crate-level documentation for an example on how to use the `Orchestrator`.

use std::fmt::Display;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context};
use clap::ValueEnum;
use tracing::{info, instrument, trace};

use crate::agent::AgentFactory;
use crate::configuration::Configuration;
use crate::flags::Flags;
use crate::gtp_eval::GtpEvaluator;
use crate::gtp_server::GtpServer;
use crate::inference::{BatchingFactory, ModelLoader};
use crate::logger::init_logger;
use crate::pair_eval::PairEvaluator;
use crate::puzzle::{PuzzleReport, PuzzleSolver};
use crate::records::{ExampleWriter, GameRecordReader, GameRecordWriter};
use crate::results::EvalReport;
use crate::selfplay::{SelfPlayReport, SelfPlayer};

/// The external pieces every mode is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub models: Arc<dyn ModelLoader>,
    pub agents: Arc<dyn AgentFactory>,
    pub examples: Arc<dyn ExampleWriter>,
    pub records: Arc<dyn GameRecordWriter>,
    pub record_reader: Arc<dyn GameRecordReader>,
}

/// What to run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Selfplay,
    Eval,
    Gtp,
    Puzzle,
}

/// Final report of a mode.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeReport {
    SelfPlay(SelfPlayReport),
    Eval(EvalReport),
    Gtp,
    Puzzle(PuzzleReport),
}

impl Display for ModeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeReport::SelfPlay(report) => report.fmt(f),
            ModeReport::Eval(report) => report.fmt(f),
            ModeReport::Gtp => write!(f, "GTP session ended"),
            ModeReport::Puzzle(report) => report.fmt(f),
        }
    }
}

pub struct Orchestrator {
    collaborators: Collaborators,
    config: Configuration,
}

impl Orchestrator {
    /// Create an [`Orchestrator`], starting the file logger if the configuration asks
    /// for one.
    #[instrument(skip_all)]
    pub fn new(collaborators: Collaborators, config: Configuration) -> anyhow::Result<Self> {
        if config.log {
            let path = init_logger(config.log_dir.as_deref())?;
            info!(log_file = %path.display(), "logging to file");
        }
        trace!(?config);

        Ok(Orchestrator {
            collaborators,
            config,
        })
    }

    /// Run `mode` to completion.
    ///
    /// # Errors
    /// On any fatal condition of the mode: configuration errors, collaborator I/O
    /// failures, internal inconsistencies. When several units fail, the first one's
    /// error is returned after all units stopped.
    #[instrument(skip(self, flags))]
    pub fn run(&self, mode: Mode, flags: &Flags) -> anyhow::Result<ModeReport> {
        trace!(?flags);
        let report = match mode {
            Mode::Selfplay => {
                ModeReport::SelfPlay(SelfPlayer::new(&self.collaborators, flags.clone())?.run()?)
            }
            Mode::Eval => ModeReport::Eval(self.eval(flags)?),
            Mode::Gtp => {
                let stdin = std::io::stdin();
                self.serve_gtp(flags, stdin.lock(), std::io::stdout())?;
                ModeReport::Gtp
            }
            Mode::Puzzle => ModeReport::Puzzle(PuzzleSolver::new(&self.collaborators, flags).run()?),
        };

        info!("{report}");
        if self.config.verbose {
            eprintln!("{report}");
        }
        Ok(report)
    }

    fn eval(&self, flags: &Flags) -> anyhow::Result<EvalReport> {
        ensure!(
            flags.model_two.is_empty() ^ flags.gtp_client.is_empty(),
            "In 'eval' mode, please specify exactly one of 'model_two' and 'gtp_client'."
        );
        if flags.model_two.is_empty() {
            GtpEvaluator::new(&self.collaborators, flags).run()
        } else {
            PairEvaluator::new(&self.collaborators, flags).run()
        }
    }

    /// Serve the `--model` agent over GTP on `input`/`output`.
    pub fn serve_gtp<R: BufRead, W: Write>(
        &self,
        flags: &Flags,
        input: R,
        output: W,
    ) -> anyhow::Result<()> {
        let channel = self
            .collaborators
            .models
            .load(&flags.model)
            .with_context(|| format!("could not load model '{}'", flags.model))?;
        let factory = BatchingFactory::new(channel, flags.virtual_losses, 1);

        let mut options = flags.player_options();
        let basename = Path::new(&flags.model)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        options.name = format!("{}-{basename}", env!("CARGO_PKG_NAME"));

        GtpServer::new(
            self.collaborators.agents.clone(),
            factory,
            options,
            flags.courtesy_pass,
        )?
        .serve(input, output)
    }
}
