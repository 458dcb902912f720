//! Batch puzzle solving over a directory of recorded games.
//!
//! Every move of every game is a puzzle: an agent that has seen exactly the moves before
//! it is asked for its best move, and scores a hit when it picks the recorded one.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, info};

use crate::agent::Agent;
use crate::coord::Move;
use crate::flags::Flags;
use crate::inference::BatchingFactory;
use crate::orchestrator::Collaborators;
use crate::records::GameRecordReader;
use crate::task_group::TaskGroup;

/// Outcome of a puzzle run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PuzzleReport {
    pub solved: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl PuzzleReport {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.solved as f32 * 100.0 / self.total as f32
        }
    }
}

impl Display for PuzzleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Solved {} of {} puzzles ({:.1}%), total time {:.3} sec.",
            self.solved,
            self.total,
            self.percentage(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Main lines of every `*.sgf` file in `dir`, in file name order.
pub fn load_games(reader: &dyn GameRecordReader, dir: &Path) -> anyhow::Result<Vec<Vec<Move>>> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("could not list {}", dir.display()))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("could not list {}", dir.display()))?;
    paths.retain(|path| path.extension().is_some_and(|ext| ext == "sgf"));
    paths.sort();

    paths
        .iter()
        .map(|path| {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("could not read {}", path.display()))?;
            reader
                .main_line(&contents)
                .with_context(|| format!("could not parse {}", path.display()))
        })
        .collect()
}

pub struct PuzzleSolver<'a> {
    collaborators: &'a Collaborators,
    flags: &'a Flags,
}

impl<'a> PuzzleSolver<'a> {
    pub fn new(collaborators: &'a Collaborators, flags: &'a Flags) -> Self {
        Self {
            collaborators,
            flags,
        }
    }

    /// Solve every position of the games in `--sgf_dir`.
    pub fn run(&self) -> anyhow::Result<PuzzleReport> {
        let start = Instant::now();
        let flags = self.flags;
        let games = load_games(
            self.collaborators.record_reader.as_ref(),
            Path::new(&flags.sgf_dir),
        )?;
        let total: usize = games.iter().map(Vec::len).sum();

        let channel = self
            .collaborators
            .models
            .load(&flags.model)
            .with_context(|| format!("could not load model '{}'", flags.model))?;
        let factory = BatchingFactory::new(channel, flags.virtual_losses, total.max(1));
        info!(
            model = flags.model,
            games = games.len(),
            puzzles = total,
            elapsed = ?start.elapsed(),
            "inference factory created"
        );

        let puzzles = self.set_up(&factory, &games)?;

        let solved = AtomicUsize::new(0);
        TaskGroup::new("puzzle").run_each(puzzles, |unit, (mut agent, expected)| {
            let mv = agent.suggest_move()?;
            debug!(unit, ?mv, ?expected);
            if mv == expected {
                solved.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        })?;

        let report = PuzzleReport {
            solved: solved.into_inner(),
            total,
            elapsed: start.elapsed(),
        };
        info!("{report}");
        Ok(report)
    }

    /// One agent per move, positioned right before that move.
    ///
    /// A game of `n` moves starts with `n` fresh agents. For each move the last agent is
    /// taken as that move's puzzle and the remaining ones play the move.
    fn set_up(
        &self,
        factory: &BatchingFactory,
        games: &[Vec<Move>],
    ) -> anyhow::Result<Vec<(Box<dyn Agent>, Move)>> {
        let mut options = self.flags.player_options();
        options.verbose = false;

        let mut puzzles = Vec::new();
        for moves in games {
            let mut players = moves
                .iter()
                .map(|_| {
                    self.collaborators
                        .agents
                        .new_agent(Box::new(factory.new_handle()), &options)
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            for &mv in moves {
                let player = players.pop().context("ran out of puzzle agents")?;
                puzzles.push((player, mv));
                for player in players.iter_mut() {
                    player.play_move(mv)?;
                }
            }
        }
        Ok(puzzles)
    }
}
