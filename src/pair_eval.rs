//! Lock-step evaluation of two models against each other.
//!
//! Every unit plays one game between the two models. Odd units start with the models
//! swapped and wait once on the barrier before their first move, so they lag one round
//! behind: in every barrier round all units then query the same model, and the shared
//! batching wrapper sees full batches.

use std::path::Path;
use std::time::Instant;

use anyhow::{ensure, Context};
use time::OffsetDateTime;
use tracing::{info, instrument, trace};

use crate::agent::{Agent, PlayerOptions};
use crate::barrier::{BarrierMembership, ReusableBarrier};
use crate::flags::{model_name, unit_seed, Flags};
use crate::inference::{BatchingFactory, ModelSlot};
use crate::orchestrator::Collaborators;
use crate::records::{build_game_record, output_name, write_game_record};
use crate::results::{EvalReport, EvalResults};
use crate::task_group::TaskGroup;

struct Model {
    factory: BatchingFactory,
    results: EvalResults,
}

impl Model {
    fn load(
        collaborators: &Collaborators,
        model_path: &str,
        virtual_losses: usize,
        parallel_games: usize,
    ) -> anyhow::Result<Model> {
        let channel = collaborators
            .models
            .load(model_path)
            .with_context(|| format!("could not load model '{model_path}'"))?;
        Ok(Model {
            factory: BatchingFactory::new(channel, virtual_losses, parallel_games),
            results: EvalResults::new(model_name(model_path)),
        })
    }
}

pub struct PairEvaluator<'a> {
    collaborators: &'a Collaborators,
    flags: &'a Flags,
    options: PlayerOptions,
}

impl<'a> PairEvaluator<'a> {
    pub fn new(collaborators: &'a Collaborators, flags: &'a Flags) -> Self {
        let mut options = flags.player_options();
        options.inject_noise = false;
        options.soft_pick = false;
        options.random_symmetry = true;
        Self {
            collaborators,
            flags,
            options,
        }
    }

    /// Play `parallel_games` games between `--model` and `--model_two`.
    ///
    /// The report lists `--model` first.
    pub fn run(&self) -> anyhow::Result<EvalReport> {
        let start = Instant::now();
        let flags = self.flags;
        let prev_model = Model::load(
            self.collaborators,
            &flags.model,
            flags.virtual_losses,
            flags.parallel_games,
        )?;
        let cur_model = Model::load(
            self.collaborators,
            &flags.model_two,
            flags.virtual_losses,
            flags.parallel_games,
        )?;
        info!(
            model = flags.model,
            model_two = flags.model_two,
            elapsed = ?start.elapsed(),
            "inference factories created"
        );

        let num_games = flags.parallel_games;
        let barrier = ReusableBarrier::new(num_games);
        TaskGroup::new("eval").run(num_games, |unit| {
            let swap_models = unit & 1 != 0;
            let (model, other_model) = if swap_models {
                (&prev_model, &cur_model)
            } else {
                (&cur_model, &prev_model)
            };
            self.run_unit(unit, model, other_model, swap_models, &barrier)
        })?;

        info!(
            num_games,
            elapsed = ?start.elapsed(),
            "evaluation finished"
        );
        Ok(EvalReport {
            num_games,
            first: prev_model.results.score(),
            second: cur_model.results.score(),
        })
    }

    /// `model` plays black.
    #[instrument(skip(self, model, other_model, barrier))]
    fn run_unit(
        &self,
        unit: usize,
        model: &Model,
        other_model: &Model,
        swap_models: bool,
        barrier: &ReusableBarrier,
    ) -> anyhow::Result<()> {
        // leaves the barrier on every exit path
        let membership = BarrierMembership::new(barrier);
        if swap_models {
            membership.wait();
        }

        let slot = ModelSlot::new();
        let mut options = self.options.clone();
        options.random_seed = unit_seed(options.random_seed, unit);

        options.verbose = unit == 0;
        options.name = model.results.name().to_string();
        let mut player = self
            .collaborators
            .agents
            .new_agent(Box::new(slot.clone()), &options)?;

        options.verbose = false;
        options.name = other_model.results.name().to_string();
        let mut other_player = self
            .collaborators
            .agents
            .new_agent(Box::new(slot.clone()), &options)?;

        let verbose = unit == 0;
        let mut factory = &model.factory;
        let mut other_factory = &other_model.factory;
        let mut player_is_black = true;

        while !player.is_game_over() {
            // A handle that stays registered without sending requests holds back the
            // other units' batches, so every move gets its own.
            slot.install(Box::new(factory.new_handle()));
            membership.wait();
            let mv = player.suggest_move();
            slot.clear();
            let mv = mv?;
            if verbose && player_is_black {
                info!("{}", player.describe());
            }
            player.play_move(mv)?;
            other_player.play_move(mv)?;

            std::mem::swap(&mut factory, &mut other_factory);
            std::mem::swap(&mut player, &mut other_player);
            player_is_black = !player_is_black;
        }
        drop(membership);

        let (black, white) = if player_is_black {
            (player, other_player)
        } else {
            (other_player, player)
        };
        ensure!(
            black.result().to_bits() == white.result().to_bits(),
            "paired agents disagree on the result: {} vs {}",
            black.result(),
            white.result()
        );
        if black.result() > 0.0 {
            model.results.add_black_win();
        }
        if black.result() < 0.0 {
            other_model.results.add_white_win();
        }

        if verbose {
            info!(result = black.result_string(), black = black.name(), "game over");
        }

        if !self.flags.sgf_dir.is_empty() {
            self.write_sgf(unit, black.as_ref(), white.as_ref())?;
        }
        trace!(unit, "stopping");
        Ok(())
    }

    fn write_sgf(&self, unit: usize, black: &dyn Agent, white: &dyn Agent) -> anyhow::Result<()> {
        let name = format!(
            "{}-{}-{}",
            output_name(OffsetDateTime::now_utc(), unit),
            black.name(),
            white.name()
        );
        let record = build_game_record(
            (black, black.name()),
            (white, white.name()),
            self.options.komi,
            self.options.board_size,
            self.options.resign_threshold,
            true,
        )?;
        write_game_record(
            self.collaborators.records.as_ref(),
            Path::new(&self.flags.sgf_dir),
            &name,
            &record,
        )
    }
}
