//! Evaluation of one model against an external GTP engine.
//!
//! Each unit launches its own engine process and plays one game against it. Even units
//! give black to the local agent, odd units to the engine.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{info, instrument, trace};

use crate::coord::Move;
use crate::flags::{model_name, unit_seed, Flags};
use crate::gtp_client::GtpClient;
use crate::inference::BatchingFactory;
use crate::orchestrator::Collaborators;
use crate::records::{build_game_record, output_name, write_game_record};
use crate::results::{EvalReport, EvalResults};
use crate::task_group::TaskGroup;

pub struct GtpEvaluator<'a> {
    collaborators: &'a Collaborators,
    flags: &'a Flags,
}

impl<'a> GtpEvaluator<'a> {
    pub fn new(collaborators: &'a Collaborators, flags: &'a Flags) -> Self {
        Self {
            collaborators,
            flags,
        }
    }

    /// Play `parallel_games` games against `--gtp_client`.
    ///
    /// The report lists the engine first; its name is the one it gives unit 0.
    pub fn run(&self) -> anyhow::Result<EvalReport> {
        let start = Instant::now();
        let flags = self.flags;
        let channel = self
            .collaborators
            .models
            .load(&flags.model)
            .with_context(|| format!("could not load model '{}'", flags.model))?;
        // only about half of the units run a search at any time
        let factory =
            BatchingFactory::new(channel, flags.virtual_losses, (flags.parallel_games / 2).max(1));
        info!(model = flags.model, elapsed = ?start.elapsed(), "inference factory created");

        let model_results = EvalResults::new(model_name(&flags.model));
        let engine_results = EvalResults::unnamed();

        TaskGroup::new("gtp-eval").run(flags.parallel_games, |unit| {
            let engine_is_black = unit % 2 == 1;
            let (black_results, white_results) = if engine_is_black {
                (&engine_results, &model_results)
            } else {
                (&model_results, &engine_results)
            };
            self.run_unit(unit, &factory, black_results, white_results, engine_is_black)
        })?;

        info!(
            num_games = flags.parallel_games,
            elapsed = ?start.elapsed(),
            "evaluation finished"
        );
        Ok(EvalReport {
            num_games: flags.parallel_games,
            first: engine_results.score(),
            second: model_results.score(),
        })
    }

    #[instrument(skip(self, factory, black_results, white_results))]
    fn run_unit(
        &self,
        unit: usize,
        factory: &BatchingFactory,
        black_results: &EvalResults,
        white_results: &EvalResults,
        engine_is_black: bool,
    ) -> anyhow::Result<()> {
        let mut options = self.flags.player_options();
        options.verbose = unit == 0;
        options.random_seed = unit_seed(options.random_seed, unit);

        let mut agent = self
            .collaborators
            .agents
            .new_agent(Box::new(factory.new_handle()), &options)?;
        let mut client = GtpClient::launch(&self.flags.gtp_client, options.board_size, options.komi)?;

        if unit == 0 {
            assert!(!engine_is_black, "unit 0 plays black itself");
            white_results.set_name(client.name()?);
        }

        if engine_is_black {
            agent.play_move(client.gen_move()?)?;
        }

        while !agent.is_game_over() {
            let mut mv = agent.suggest_move()?;
            if !client.play(mv)? {
                mv = Move::Resign;
            }
            if options.verbose {
                info!("{}", agent.describe());
            }
            agent.play_move(mv)?;
            if agent.is_game_over() {
                break;
            }
            agent.play_move(client.gen_move()?)?;
        }

        let result = agent.result();
        if result > 0.0 {
            black_results.add_black_win();
        }
        if result < 0.0 {
            white_results.add_white_win();
        }
        if options.verbose {
            info!(result = agent.result_string(), "game over");
        }

        if !self.flags.sgf_dir.is_empty() {
            let name = format!(
                "{}-{}-{}",
                output_name(OffsetDateTime::now_utc(), unit),
                black_results.name(),
                white_results.name()
            );
            let record = build_game_record(
                (agent.as_ref(), black_results.name()),
                (agent.as_ref(), white_results.name()),
                options.komi,
                options.board_size,
                options.resign_threshold,
                true,
            )?;
            write_game_record(
                self.collaborators.records.as_ref(),
                Path::new(&self.flags.sgf_dir),
                &name,
                &record,
            )?;
        }
        trace!(unit, "stopping");
        Ok(())
    }
}
