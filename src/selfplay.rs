//! Self-play worker pool.
//!
//! `parallel_games` units each play games against themselves with one agent, sharing
//! a single batched inference channel. Every game starts by taking a
//! [`ConfigSnapshot`](crate::snapshot::ConfigSnapshot) under the shared lock (after
//! reloading the flag file if it changed) and ends by writing training examples and game
//! records. Units loop while `run_forever` is set and no other unit failed.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{info, instrument, trace};

use crate::agent::{find_bad_resign, find_bleakest_move, Agent, PlayerOptions};
use crate::flags::Flags;
use crate::inference::BatchingFactory;
use crate::orchestrator::Collaborators;
use crate::records::{
    build_game_record, output_dir, output_name, write_game_record, BigtableSpec,
};
use crate::snapshot::{ConfigSnapshot, SharedConfig};
use crate::task_group::TaskGroup;

/// Outcome of a self-play run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfPlayReport {
    pub games_played: usize,
    pub holdout_games: usize,
    pub elapsed: Duration,
}

impl Display for SelfPlayReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Played {} games ({} holdout), total time {:.3} sec.",
            self.games_played,
            self.holdout_games,
            self.elapsed.as_secs_f64()
        )
    }
}

pub struct SelfPlayer<'a> {
    collaborators: &'a Collaborators,
    config: SharedConfig,
    factory: BatchingFactory,
    parallel_games: usize,
    games_played: AtomicUsize,
    holdout_games: AtomicUsize,
}

impl<'a> SelfPlayer<'a> {
    /// Load the model and size the batching wrapper for `flags.parallel_games` agents.
    pub fn new(collaborators: &'a Collaborators, flags: Flags) -> anyhow::Result<Self> {
        let config = SharedConfig::new(flags);
        Self::with_config(collaborators, config)
    }

    /// Same as [`SelfPlayer::new`] with an explicit shared configuration (and random
    /// source).
    pub fn with_config(
        collaborators: &'a Collaborators,
        config: SharedConfig,
    ) -> anyhow::Result<Self> {
        let start = Instant::now();
        let (model, virtual_losses, parallel_games) = {
            let live = config.lock();
            (
                live.flags.model.clone(),
                live.flags.virtual_losses,
                live.flags.parallel_games,
            )
        };
        let channel = collaborators
            .models
            .load(&model)
            .with_context(|| format!("could not load model '{model}'"))?;
        let factory = BatchingFactory::new(channel, virtual_losses, parallel_games);
        info!(
            model,
            elapsed = ?start.elapsed(),
            batch_size = factory.batch_size(),
            "inference factory created"
        );

        Ok(Self {
            collaborators,
            config,
            factory,
            parallel_games,
            games_played: AtomicUsize::new(0),
            holdout_games: AtomicUsize::new(0),
        })
    }

    /// Run every unit until it stops, then report.
    pub fn run(&self) -> anyhow::Result<SelfPlayReport> {
        let start = Instant::now();
        let group = TaskGroup::new("selfplay");
        group.run(self.parallel_games, |unit| self.run_unit(unit, &group))?;

        let report = SelfPlayReport {
            games_played: self.games_played.load(Ordering::SeqCst),
            holdout_games: self.holdout_games.load(Ordering::SeqCst),
            elapsed: start.elapsed(),
        };
        info!("{report}");
        Ok(report)
    }

    #[instrument(skip(self, group))]
    fn run_unit(&self, unit: usize, group: &TaskGroup) -> anyhow::Result<()> {
        let bigtable = BigtableSpec::from_flag(&self.config.lock().flags.output_bigtable)?;

        loop {
            let (snapshot, mut agent) = {
                let mut live = self.config.lock();
                live.maybe_reload()?;
                let snapshot = live.snapshot(unit);
                let agent = self
                    .collaborators
                    .agents
                    .new_agent(Box::new(self.factory.new_handle()), &snapshot.player)?;
                (snapshot, agent)
            };

            let start = Instant::now();
            while !agent.is_game_over() {
                let mv = agent.suggest_move()?;
                if snapshot.player.verbose {
                    info!("{}", agent.describe());
                }
                agent.play_move(mv)?;
            }

            {
                // keeps the diagnostics of concurrent units apart
                let _live = self.config.lock();
                log_end_game_info(agent.as_ref(), &snapshot.player, start.elapsed());
            }

            self.write_outputs(unit, agent.as_ref(), &snapshot, bigtable.as_ref())?;
            self.games_played.fetch_add(1, Ordering::SeqCst);

            if !snapshot.run_forever || group.aborted() {
                break;
            }
        }

        trace!(unit, "stopping");
        Ok(())
    }

    fn write_outputs(
        &self,
        unit: usize,
        agent: &dyn Agent,
        snapshot: &ConfigSnapshot,
        bigtable: Option<&BigtableSpec>,
    ) -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        let name = output_name(now, unit);

        let is_holdout = self.config.lock().draw_holdout(snapshot.holdout_pct);
        if is_holdout {
            self.holdout_games.fetch_add(1, Ordering::SeqCst);
        }
        let example_dir = if is_holdout {
            &snapshot.holdout_dir
        } else {
            &snapshot.output_dir
        };
        if !example_dir.is_empty() {
            let dir = output_dir(now, example_dir)?;
            self.collaborators
                .examples
                .write_examples(&dir, &name, agent)
                .with_context(|| format!("could not write examples to {}", dir.display()))?;
        }
        if let Some(spec) = bigtable {
            self.collaborators
                .examples
                .write_bigtable(spec, agent)
                .with_context(|| format!("could not write examples to {spec:?}"))?;
        }

        if !snapshot.sgf_dir.is_empty() {
            let sgf_dir = Path::new(&snapshot.sgf_dir);
            for (sub_dir, write_comments) in [("clean", false), ("full", true)] {
                let record = build_game_record(
                    (agent, agent.name()),
                    (agent, agent.name()),
                    snapshot.player.komi,
                    snapshot.player.board_size,
                    snapshot.player.resign_threshold,
                    write_comments,
                )?;
                let dir = output_dir(now, sgf_dir.join(sub_dir))?;
                write_game_record(self.collaborators.records.as_ref(), &dir, &name, &record)?;
            }
        }
        Ok(())
    }
}

fn log_end_game_info(agent: &dyn Agent, options: &PlayerOptions, game_time: Duration) {
    let history = agent.history();
    info!(
        result = agent.result_string(),
        game_time = game_time.as_secs_f64(),
        moves = history.len(),
        "game over"
    );
    if history.is_empty() {
        return;
    }

    if let Some((mv, q)) = find_bleakest_move(agent) {
        info!(mv, q, "bleakest eval");
    }

    // only meaningful when nobody was allowed to resign
    if !options.resign_enabled {
        if let Some((mv, q)) = find_bad_resign(history, options.resign_threshold, agent.result())
        {
            info!(mv, q, "bad resign");
        }
    }
}
