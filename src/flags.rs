//! Tunable parameters of the four modes.
//!
//! Flags keep the snake_case names of the command line (`--parallel_games=16`) so that
//! the same names can be assigned from a hot-reload file through [`Flags::set`].

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{ArgAction, Args};

use crate::agent::PlayerOptions;
use crate::coord::DEFAULT_BOARD_SIZE;

/// Every mode-specific knob. Parsed once from the command line, and later re-assigned
/// by name when a flag file changes.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct Flags {
    /// If true and in GTP mode, always pass when the opponent passes.
    #[arg(long = "courtesy_pass", default_value_t = false, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub courtesy_pass: bool,

    /// Resign threshold.
    #[arg(long = "resign_threshold", default_value_t = -0.999, allow_negative_numbers = true)]
    pub resign_threshold: f32,

    /// Komi.
    #[arg(long = "komi", default_value_t = 7.5, allow_negative_numbers = true)]
    pub komi: f32,

    /// Board size sent to external engines and used for GTP vertices.
    #[arg(long = "board_size", default_value_t = DEFAULT_BOARD_SIZE)]
    pub board_size: usize,

    /// Fraction of games to disable resignation for.
    #[arg(long = "disable_resign_pct", default_value_t = 0.1)]
    pub disable_resign_pct: f32,

    /// Random seed, 0 for a time-based seed. Controls the moves played, not resignation
    /// or holdout draws.
    #[arg(long = "seed", default_value_t = 0)]
    pub seed: u64,

    /// Number of readouts to make during tree search for each move.
    #[arg(long = "num_readouts", default_value_t = 100)]
    pub num_readouts: usize,

    /// Number of virtual losses when running tree search.
    #[arg(long = "virtual_losses", default_value_t = 8)]
    pub virtual_losses: usize,

    /// Inject noise into the root position at the start of each search.
    #[arg(long = "inject_noise", default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub inject_noise: bool,

    /// Pick early moves proportionally to their visit counts.
    #[arg(long = "soft_pick", default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub soft_pick: bool,

    /// Randomly flip and rotate the board features before running the model.
    #[arg(long = "random_symmetry", default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub random_symmetry: bool,

    /// Optional flag file, reloaded between self-play games when it changes.
    #[arg(long = "flags_path", default_value = "")]
    pub flags_path: String,

    /// If non-zero, seconds to think per move instead of a fixed number of readouts.
    #[arg(long = "seconds_per_move", default_value_t = 0.0)]
    pub seconds_per_move: f64,

    /// If non-zero, maximum thinking time for a whole game.
    #[arg(long = "time_limit", default_value_t = 0.0)]
    pub time_limit: f64,

    /// Decay of the per-move thinking time once `time_limit` gets short.
    #[arg(long = "decay_factor", default_value_t = 0.98)]
    pub decay_factor: f64,

    /// When running self-play, keep playing games until the process is killed.
    #[arg(long = "run_forever", default_value_t = false, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub run_forever: bool,

    /// Path to the model.
    #[arg(long = "model", default_value = "")]
    pub model: String,

    /// Second model for `eval` mode. Exclusive with `gtp_client`.
    #[arg(long = "model_two", default_value = "")]
    pub model_two: String,

    /// External GTP engine command line for `eval` mode. Exclusive with `model_two`.
    #[arg(long = "gtp_client", default_value = "")]
    pub gtp_client: String,

    /// Number of games to play in parallel.
    #[arg(long = "parallel_games", default_value_t = 32)]
    pub parallel_games: usize,

    /// Training examples directory. Empty disables writing.
    #[arg(long = "output_dir", default_value = "")]
    pub output_dir: String,

    /// Holdout examples directory. Empty disables writing.
    #[arg(long = "holdout_dir", default_value = "")]
    pub holdout_dir: String,

    /// Remote example table as `project,instance,table`. Empty disables writing.
    #[arg(long = "output_bigtable", default_value = "")]
    pub output_bigtable: String,

    /// Game record directory for self-play and evaluation, and puzzle input directory.
    #[arg(long = "sgf_dir", default_value = "")]
    pub sgf_dir: String,

    /// Fraction of games to hold out for validation.
    #[arg(long = "holdout_pct", default_value_t = 0.03)]
    pub holdout_pct: f32,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            courtesy_pass: false,
            resign_threshold: -0.999,
            komi: 7.5,
            board_size: DEFAULT_BOARD_SIZE,
            disable_resign_pct: 0.1,
            seed: 0,
            num_readouts: 100,
            virtual_losses: 8,
            inject_noise: true,
            soft_pick: true,
            random_symmetry: true,
            flags_path: String::new(),
            seconds_per_move: 0.0,
            time_limit: 0.0,
            decay_factor: 0.98,
            run_forever: false,
            model: String::new(),
            model_two: String::new(),
            gtp_client: String::new(),
            parallel_games: 32,
            output_dir: String::new(),
            holdout_dir: String::new(),
            output_bigtable: String::new(),
            sgf_dir: String::new(),
            holdout_pct: 0.03,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value '{value}' for flag '{name}'"))
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => bail!("invalid value '{value}' for boolean flag '{name}'"),
    }
}

impl Flags {
    /// Assign one flag by its command line name (without the leading `--`).
    ///
    /// # Errors
    /// When the flag does not exist or the value does not parse.
    pub fn set(&mut self, name: &str, value: &str) -> anyhow::Result<()> {
        match name {
            "courtesy_pass" => self.courtesy_pass = parse_bool(name, value)?,
            "resign_threshold" => self.resign_threshold = parse(name, value)?,
            "komi" => self.komi = parse(name, value)?,
            "board_size" => self.board_size = parse(name, value)?,
            "disable_resign_pct" => self.disable_resign_pct = parse(name, value)?,
            "seed" => self.seed = parse(name, value)?,
            "num_readouts" => self.num_readouts = parse(name, value)?,
            "virtual_losses" => self.virtual_losses = parse(name, value)?,
            "inject_noise" => self.inject_noise = parse_bool(name, value)?,
            "soft_pick" => self.soft_pick = parse_bool(name, value)?,
            "random_symmetry" => self.random_symmetry = parse_bool(name, value)?,
            "flags_path" => self.flags_path = value.to_string(),
            "seconds_per_move" => self.seconds_per_move = parse(name, value)?,
            "time_limit" => self.time_limit = parse(name, value)?,
            "decay_factor" => self.decay_factor = parse(name, value)?,
            "run_forever" => self.run_forever = parse_bool(name, value)?,
            "model" => self.model = value.to_string(),
            "model_two" => self.model_two = value.to_string(),
            "gtp_client" => self.gtp_client = value.to_string(),
            "parallel_games" => self.parallel_games = parse(name, value)?,
            "output_dir" => self.output_dir = value.to_string(),
            "holdout_dir" => self.holdout_dir = value.to_string(),
            "output_bigtable" => self.output_bigtable = value.to_string(),
            "sgf_dir" => self.sgf_dir = value.to_string(),
            "holdout_pct" => self.holdout_pct = parse(name, value)?,
            _ => bail!("unknown flag '{name}'"),
        }
        Ok(())
    }

    /// Search options shared by every agent of a run, before per-unit adjustments.
    pub fn player_options(&self) -> PlayerOptions {
        PlayerOptions {
            name: String::new(),
            verbose: false,
            inject_noise: self.inject_noise,
            soft_pick: self.soft_pick,
            random_symmetry: self.random_symmetry,
            resign_enabled: true,
            resign_threshold: self.resign_threshold,
            batch_size: self.virtual_losses,
            komi: self.komi,
            board_size: self.board_size,
            random_seed: self.seed,
            num_readouts: self.num_readouts,
            seconds_per_move: self.seconds_per_move,
            time_limit: self.time_limit,
            decay_factor: self.decay_factor,
        }
    }
}

/// Seed offset between consecutive units, so explicitly seeded units do not replay the
/// same games.
pub const UNIT_SEED_STRIDE: u64 = 1_299_283;

/// Per-unit seed derived from the base seed. A zero seed stays zero (time-based).
pub fn unit_seed(base_seed: u64, unit: usize) -> u64 {
    if base_seed == 0 {
        0
    } else {
        base_seed.wrapping_add(UNIT_SEED_STRIDE.wrapping_mul(unit as u64))
    }
}

/// Model name used in reports: the file stem of the model path.
pub fn model_name(model_path: &str) -> String {
    Path::new(model_path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| model_path.to_string())
}
