//! Game records, training examples and where they are written.
//!
//! Serialization itself belongs to the collaborators behind [`GameRecordWriter`],
//! [`GameRecordReader`] and [`ExampleWriter`]; this module decides names, directories
//! and the content of a [`GameRecord`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context};
use time::{format_description, OffsetDateTime, UtcOffset};

use crate::agent::{Agent, InferenceInfo};
use crate::coord::{Color, Move};

/// One move of a game record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMove {
    pub color: Color,
    pub mv: Move,
    pub comment: String,
}

/// A finished game, ready to be serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub moves: Vec<RecordedMove>,
    pub komi: f32,
    pub board_size: usize,
    pub result: String,
    pub black_name: String,
    pub white_name: String,
    pub game_comment: String,
}

/// Persists game records (e.g. as SGF).
pub trait GameRecordWriter: Send + Sync {
    /// Write `record` to `path`. The parent directory already exists.
    fn write_record(&self, path: &Path, record: &GameRecord) -> anyhow::Result<()>;
}

/// Reads the principal line of a stored game record.
pub trait GameRecordReader: Send + Sync {
    fn main_line(&self, contents: &str) -> anyhow::Result<Vec<Move>>;
}

/// Persists the training examples of a finished game.
pub trait ExampleWriter: Send + Sync {
    /// Write examples under `dir` (which may not exist yet) using `name`.
    fn write_examples(&self, dir: &Path, name: &str, agent: &dyn Agent) -> anyhow::Result<()>;

    /// Write examples to a remote table.
    fn write_bigtable(&self, spec: &BigtableSpec, agent: &dyn Agent) -> anyhow::Result<()>;
}

/// Remote example table, given as `project,instance,table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigtableSpec {
    pub project: String,
    pub instance: String,
    pub table: String,
}

impl FromStr for BigtableSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        let [project, instance, table] = parts.as_slice() else {
            bail!("Bigtable output must be of the form: project,instance,table (got '{s}')");
        };
        Ok(BigtableSpec {
            project: project.to_string(),
            instance: instance.to_string(),
            table: table.to_string(),
        })
    }
}

impl BigtableSpec {
    /// `None` for an empty flag, an error for anything but three parts.
    pub fn from_flag(flag: &str) -> anyhow::Result<Option<BigtableSpec>> {
        if flag.is_empty() {
            return Ok(None);
        }
        flag.parse().map(Some)
    }
}

fn host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// `<unix seconds>-<hostname>-<unit>`
pub fn output_name(now: OffsetDateTime, unit: usize) -> String {
    format!("{}-{}-{unit}", now.unix_timestamp(), host_name())
}

/// `root/<YYYY-MM-DD-HH>` with the hour in UTC.
pub fn output_dir(now: OffsetDateTime, root: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
    let format = format_description::parse("[year]-[month]-[day]-[hour]")
        .context("invalid output dir format")?;
    let hour = now
        .to_offset(UtcOffset::UTC)
        .format(&format)
        .context("could not format output dir")?;
    Ok(root.as_ref().join(hour))
}

/// `model(first,last), ...`
pub fn format_inference_info(inferences: &[InferenceInfo]) -> String {
    inferences
        .iter()
        .map(|info| format!("{}({},{})", info.model, info.first_move, info.last_move))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the record of a game played between `black` and `white`.
///
/// Both agents must have seen the same moves; even moves are taken from black's
/// history and odd moves from white's, so each move carries its own player's comment.
pub fn build_game_record(
    black: (&dyn Agent, &str),
    white: (&dyn Agent, &str),
    komi: f32,
    board_size: usize,
    resign_threshold: f32,
    write_comments: bool,
) -> anyhow::Result<GameRecord> {
    let (player_b, name_b) = black;
    let (player_w, name_w) = white;
    let history_b = player_b.history();
    let history_w = player_w.history();
    if history_b.len() != history_w.len() {
        bail!(
            "histories differ in length: {} vs {}",
            history_b.len(),
            history_w.len()
        );
    }
    let log_names = name_b != name_w;

    let moves = (0..history_b.len())
        .map(|i| {
            let record = if i % 2 == 0 { &history_b[i] } else { &history_w[i] };
            let comment = if !write_comments {
                String::new()
            } else if i == 0 {
                format!("Resign Threshold: {resign_threshold}\n{}", record.comment)
            } else if log_names {
                let name = if i % 2 == 0 { name_b } else { name_w };
                format!("{name}\n{}", record.comment)
            } else {
                record.comment.clone()
            };
            RecordedMove {
                color: record.color,
                mv: record.mv,
                comment,
            }
        })
        .collect();

    Ok(GameRecord {
        moves,
        komi,
        board_size,
        result: player_b.result_string(),
        black_name: name_b.to_string(),
        white_name: name_w.to_string(),
        game_comment: format!(
            "B inferences: {}\nW inferences: {}",
            format_inference_info(player_b.inferences()),
            format_inference_info(player_w.inferences())
        ),
    })
}

/// Create `dir` and hand `record` to `writer` as `dir/name.sgf`.
pub fn write_game_record(
    writer: &dyn GameRecordWriter,
    dir: &Path,
    name: &str,
    record: &GameRecord,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create directory {}", dir.display()))?;
    let path = dir.join(format!("{name}.sgf"));
    writer
        .write_record(&path, record)
        .with_context(|| format!("could not write game record {}", path.display()))
}
