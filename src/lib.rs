//! # Go Arena
//!
//! Runs many move-search agents for a board game side by side, all sharing one
//! throughput-sensitive inference channel.
//!
//! It provides:
//! - Self-play generation with hot-reloadable flags ([`SelfPlayer`](crate::selfplay::SelfPlayer))
//! - Lock-step evaluation of two models ([`PairEvaluator`](crate::pair_eval::PairEvaluator))
//! - Evaluation against an external GTP engine ([`GtpEvaluator`](crate::gtp_eval::GtpEvaluator))
//! - A GTP front-end for a single agent ([`GtpServer`](crate::gtp_server::GtpServer))
//! - Batch puzzle solving over recorded games ([`PuzzleSolver`](crate::puzzle::PuzzleSolver))
//!
//! Each mode runs a fixed cohort of OS threads, one per game (or per puzzle). Agents never
//! talk to the inference channel directly: they get a handle from a
//! [`BatchingFactory`](crate::inference::BatchingFactory) that groups the requests of all
//! live handles into batches sized by [`compute_batch_size`](crate::inference::compute_batch_size).
//!
//! # Documentation Overview
//!
//! - For mode selection and the pieces a run is assembled from, see the [`orchestrator`] module.
//! - For the tunables of every mode, see [`Flags`](crate::flags::Flags); for logging and
//!   reporting, see [`Configuration`](crate::configuration::Configuration).
//! - To plug in a search agent, implement [`Agent`](crate::agent::Agent) and
//!   [`AgentFactory`](crate::agent::AgentFactory).
//! - To plug in a network, implement [`Inference`](crate::inference::Inference) and
//!   [`ModelLoader`](crate::inference::ModelLoader).
//!
//! The search algorithm, the network, and the on-disk formats of examples and game
//! records are not part of this crate.
//!
//! # Usage Example
//!
//! ```no_run
//! # use go_arena::prelude::*;
//! # fn collaborators() -> Collaborators { unimplemented!() }
//! fn main() -> anyhow::Result<()> {
//!     // Your model loader, agent factory and writers
//!     let collaborators: Collaborators = collaborators();
//!
//!     let orchestrator = Orchestrator::new(collaborators, Configuration::from_env())?;
//!
//!     let flags = Flags {
//!         model: "/models/000123.pb".to_string(),
//!         model_two: "/models/000120.pb".to_string(),
//!         parallel_games: 16,
//!         ..Flags::default()
//!     };
//!     let report = orchestrator.run(Mode::Eval, &flags)?;
//!     println!("{report}");
//!
//!     Ok(())
//! }
//! ```
//!
//! Or let [`cli::run`] parse `--mode` and the flags from the command line.

pub use anyhow;

pub mod agent;
pub mod barrier;
pub mod cli;
pub mod configuration;
pub mod coord;
pub mod engine_process;
pub mod flags;
pub mod gtp_client;
pub mod gtp_eval;
pub mod gtp_server;
pub mod hot_reload;
pub mod inference;
mod logger;
pub mod orchestrator;
pub mod pair_eval;
pub mod puzzle;
pub mod records;
pub mod results;
pub mod selfplay;
pub mod snapshot;
pub mod task_group;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use go_arena::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{Agent, AgentFactory, MoveRecord, PlayerOptions};
    pub use crate::configuration::Configuration;
    pub use crate::coord::{Color, Coord, Move};
    pub use crate::flags::Flags;
    pub use crate::inference::{Features, Inference, InferenceOutput, ModelLoader};
    pub use crate::orchestrator::{Collaborators, Mode, ModeReport, Orchestrator};
    pub use crate::records::{
        BigtableSpec, ExampleWriter, GameRecord, GameRecordReader, GameRecordWriter,
    };
}
