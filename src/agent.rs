//! Traits the move-search agent has to implement to be driven by the orchestrator.
//!
//! The search itself is opaque: the orchestrator only asks for moves, applies them, and
//! reads back the outcome and history once a game is over.

use crate::coord::{Color, Move};
use crate::inference::Inference;

/// Search parameters handed to every agent at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOptions {
    pub name: String,
    pub verbose: bool,
    pub inject_noise: bool,
    pub soft_pick: bool,
    pub random_symmetry: bool,
    pub resign_enabled: bool,
    pub resign_threshold: f32,
    /// Feature vectors an agent may have in flight at once (virtual losses).
    pub batch_size: usize,
    pub komi: f32,
    pub board_size: usize,
    /// Zero means "seed from time".
    pub random_seed: u64,
    pub num_readouts: usize,
    pub seconds_per_move: f64,
    pub time_limit: f64,
    pub decay_factor: f64,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            verbose: false,
            inject_noise: true,
            soft_pick: true,
            random_symmetry: true,
            resign_enabled: true,
            resign_threshold: -0.999,
            batch_size: 8,
            komi: 7.5,
            board_size: crate::coord::DEFAULT_BOARD_SIZE,
            random_seed: 0,
            num_readouts: 100,
            seconds_per_move: 0.0,
            time_limit: 0.0,
            decay_factor: 0.98,
        }
    }
}

/// One played move as remembered by an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
    pub color: Color,
    pub mv: Move,
    /// Search evaluation after the move, positive favors black.
    pub q: f32,
    pub comment: String,
}

impl MoveRecord {
    /// Evaluation seen from the side that played the move.
    pub fn q_perspective(&self) -> f32 {
        match self.color {
            Color::Black => self.q,
            Color::White => -self.q,
        }
    }
}

/// Range of moves an agent played with one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceInfo {
    pub model: String,
    pub first_move: usize,
    pub last_move: usize,
}

/// A move-search agent playing one game.
pub trait Agent: Send {
    fn name(&self) -> &str;

    /// Run a search and return the move it picks. Does not play it.
    fn suggest_move(&mut self) -> anyhow::Result<Move>;

    /// Apply `mv` for the side to move.
    fn play_move(&mut self, mv: Move) -> anyhow::Result<()>;

    fn is_game_over(&self) -> bool;

    fn to_play(&self) -> Color;

    /// Final result, positive when black won.
    fn result(&self) -> f32;

    /// Human readable result, e.g. `B+R`.
    fn result_string(&self) -> String;

    fn history(&self) -> &[MoveRecord];

    /// Human readable state of the current search.
    fn describe(&self) -> String;

    /// Models used during the game, for game records.
    fn inferences(&self) -> &[InferenceInfo] {
        &[]
    }
}

/// Builds agents on top of an inference handle.
pub trait AgentFactory: Send + Sync {
    fn new_agent(
        &self,
        inference: Box<dyn Inference>,
        options: &PlayerOptions,
    ) -> anyhow::Result<Box<dyn Agent>>;
}

/// History index where the eventual winner's evaluation was lowest.
///
/// Returns `None` for drawn or empty games.
pub fn find_bleakest_move(agent: &dyn Agent) -> Option<(usize, f32)> {
    let result = agent.result();
    if result == 0.0 {
        return None;
    }
    let sign = result.signum();
    agent
        .history()
        .iter()
        .enumerate()
        .map(|(i, record)| (i, record.q * sign))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, q)| (i, q * sign))
}

/// First move where the mover's evaluation fell below `resign_threshold`, if the
/// eventual winner would have resigned there.
///
/// Only the first crossing counts: a later bad resignation of the winner would never
/// have been reached because the game would have ended at the first one.
pub fn find_bad_resign(
    history: &[MoveRecord],
    resign_threshold: f32,
    result: f32,
) -> Option<(usize, f32)> {
    let (i, record) = history
        .iter()
        .enumerate()
        .find(|(_, record)| record.q_perspective() < resign_threshold)?;
    ((record.q < 0.0) != (result < 0.0)).then_some((i, record.q))
}

#[cfg(test)]
mod agent_tests {
    use super::*;
    use crate::coord::Coord;

    fn record(color: Color, q: f32) -> MoveRecord {
        MoveRecord {
            color,
            mv: Move::Play(Coord::new(0, 0)),
            q,
            comment: String::new(),
        }
    }

    #[test]
    fn perspective_flips_for_white() {
        assert_eq!(record(Color::Black, 0.5).q_perspective(), 0.5);
        assert_eq!(record(Color::White, 0.5).q_perspective(), -0.5);
    }

    #[test]
    fn bad_resign_when_winner_crossed_first() {
        // white thinks it is lost (q=0.95 for black) but white wins
        let history = vec![
            record(Color::Black, 0.1),
            record(Color::White, 0.95),
            record(Color::Black, -0.99),
        ];
        assert_eq!(find_bad_resign(&history, -0.9, -1.0), Some((1, 0.95)));
    }

    #[test]
    fn correct_resign_is_not_reported() {
        let history = vec![record(Color::Black, 0.1), record(Color::White, 0.95)];
        assert_eq!(find_bad_resign(&history, -0.9, 1.0), None);
    }

    #[test]
    fn only_first_crossing_counts() {
        let history = vec![record(Color::Black, -0.95), record(Color::White, 0.99)];
        // black crossed first and black lost: correct, the later white crossing is ignored
        assert_eq!(find_bad_resign(&history, -0.9, -1.0), None);
    }

    #[test]
    fn no_crossing() {
        let history = vec![record(Color::Black, 0.0), record(Color::White, 0.0)];
        assert_eq!(find_bad_resign(&history, -0.9, 1.0), None);
    }
}
