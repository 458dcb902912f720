#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use go_arena::prelude::*;

/// Inference channel that answers zeros and remembers every batch size.
#[derive(Default)]
pub struct CountingInference {
    pub features: AtomicUsize,
    pub batches: Mutex<Vec<usize>>,
}

impl Inference for CountingInference {
    fn run_many(&self, features: Vec<Features>) -> anyhow::Result<Vec<InferenceOutput>> {
        self.features.fetch_add(features.len(), Ordering::SeqCst);
        self.batches.lock().unwrap().push(features.len());
        Ok(vec![InferenceOutput::default(); features.len()])
    }
}

impl CountingInference {
    pub fn sorted_batches(&self) -> Vec<usize> {
        let mut batches = self.batches.lock().unwrap().clone();
        batches.sort();
        batches
    }
}

/// One counting channel per model path. Paths containing `missing` fail to load.
#[derive(Default)]
pub struct FakeModels {
    channels: Mutex<HashMap<String, Arc<CountingInference>>>,
}

impl FakeModels {
    pub fn channel(&self, model_path: &str) -> Arc<CountingInference> {
        self.channels
            .lock()
            .unwrap()
            .entry(model_path.to_string())
            .or_default()
            .clone()
    }
}

impl ModelLoader for FakeModels {
    fn load(&self, model_path: &str) -> anyhow::Result<Arc<dyn Inference>> {
        if model_path.contains("missing") {
            bail!("no such model");
        }
        Ok(self.channel(model_path))
    }
}

/// Move an agent suggests after `n` moves: walks the top row.
pub fn scripted_move(n: usize, board_size: usize) -> Move {
    Move::Play(Coord::new(n / board_size, n % board_size))
}

/// Runs once, right after the given total number of suggested moves.
pub type SuggestHook = (usize, Box<dyn FnOnce() + Send>);

/// Deterministic agent: suggests [`scripted_move`] after one inference request of
/// `batch_size` features, ends after `game_length` moves, on resignation or on two passes.
/// Black wins unless black resigned; a dissenting agent reports the opposite.
pub struct ScriptedAgent {
    options: PlayerOptions,
    inference: Box<dyn Inference>,
    game_length: usize,
    history: Vec<MoveRecord>,
    suggested_from: Arc<Mutex<Vec<Vec<Move>>>>,
    hook: Arc<Mutex<Option<SuggestHook>>>,
    fails: bool,
    dissents: bool,
}

impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn suggest_move(&mut self) -> anyhow::Result<Move> {
        if self.fails {
            bail!("search blew up");
        }
        let n = self.history.len();
        let features = vec![Features(vec![n as f32]); self.options.batch_size.max(1)];
        let outputs = self.inference.run_many(features)?;
        assert_eq!(outputs.len(), self.options.batch_size.max(1));
        let suggested = {
            let mut suggested_from = self.suggested_from.lock().unwrap();
            suggested_from.push(self.history.iter().map(|r| r.mv).collect());
            suggested_from.len()
        };
        let hook = {
            let mut hook = self.hook.lock().unwrap();
            if hook.as_ref().is_some_and(|(at, _)| *at == suggested) {
                hook.take()
            } else {
                None
            }
        };
        if let Some((_, hook)) = hook {
            hook();
        }
        Ok(scripted_move(n, self.options.board_size))
    }

    fn play_move(&mut self, mv: Move) -> anyhow::Result<()> {
        if self.is_game_over() {
            bail!("game is over");
        }
        let n = self.history.len();
        self.history.push(MoveRecord {
            color: self.to_play(),
            mv,
            q: 0.5 - n as f32 * 0.1,
            comment: format!("N={n}"),
        });
        Ok(())
    }

    fn is_game_over(&self) -> bool {
        let two_passes = self.history.len() >= 2
            && self.history[self.history.len() - 2..]
                .iter()
                .all(|r| r.mv == Move::Pass);
        self.history.len() >= self.game_length
            || two_passes
            || self.history.last().is_some_and(|r| r.mv == Move::Resign)
    }

    fn to_play(&self) -> Color {
        if self.history.len() % 2 == 0 {
            Color::Black
        } else {
            Color::White
        }
    }

    fn result(&self) -> f32 {
        let result = match self.history.last() {
            Some(r) if r.mv == Move::Resign && r.color == Color::Black => -1.0,
            _ => 1.0,
        };
        if self.dissents {
            -result
        } else {
            result
        }
    }

    fn result_string(&self) -> String {
        match self.history.last() {
            Some(r) if r.mv == Move::Resign => {
                format!("{}+R", if r.color == Color::Black { "W" } else { "B" })
            }
            _ => "B+1.5".to_string(),
        }
    }

    fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    fn describe(&self) -> String {
        format!("{} moves", self.history.len())
    }
}

pub struct FakeAgents {
    pub game_length: usize,
    pub created: Mutex<Vec<PlayerOptions>>,
    pub suggested_from: Arc<Mutex<Vec<Vec<Move>>>>,
    hook: Arc<Mutex<Option<SuggestHook>>>,
    failing_agent: Option<usize>,
    dissenter: Option<String>,
}

impl FakeAgents {
    pub fn new(game_length: usize) -> Self {
        Self {
            game_length,
            created: Mutex::new(Vec::new()),
            suggested_from: Arc::new(Mutex::new(Vec::new())),
            hook: Arc::new(Mutex::new(None)),
            failing_agent: None,
            dissenter: None,
        }
    }

    /// The `index`-th agent created (from 0) fails its first search.
    pub fn failing_agent(mut self, index: usize) -> Self {
        self.failing_agent = Some(index);
        self
    }

    /// Agents named `name` report the negated result.
    pub fn dissenter(mut self, name: &str) -> Self {
        self.dissenter = Some(name.to_string());
        self
    }

    /// Run `hook` once, right after the `suggestions`-th suggested move of the run.
    pub fn on_suggestion(self, suggestions: usize, hook: impl FnOnce() + Send + 'static) -> Self {
        *self.hook.lock().unwrap() = Some((suggestions, Box::new(hook)));
        self
    }
}

impl AgentFactory for FakeAgents {
    fn new_agent(
        &self,
        inference: Box<dyn Inference>,
        options: &PlayerOptions,
    ) -> anyhow::Result<Box<dyn Agent>> {
        let index = {
            let mut created = self.created.lock().unwrap();
            created.push(options.clone());
            created.len() - 1
        };
        Ok(Box::new(ScriptedAgent {
            options: options.clone(),
            inference,
            game_length: self.game_length,
            history: Vec::new(),
            suggested_from: self.suggested_from.clone(),
            hook: self.hook.clone(),
            fails: self.failing_agent == Some(index),
            dissents: self.dissenter.as_deref() == Some(options.name.as_str()),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExampleWrite {
    pub dir: PathBuf,
    pub name: String,
    pub moves: usize,
}

#[derive(Default)]
pub struct RecordingExamples {
    pub writes: Mutex<Vec<ExampleWrite>>,
    pub bigtable: Mutex<Vec<BigtableSpec>>,
}

impl ExampleWriter for RecordingExamples {
    fn write_examples(&self, dir: &Path, name: &str, agent: &dyn Agent) -> anyhow::Result<()> {
        self.writes.lock().unwrap().push(ExampleWrite {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            moves: agent.history().len(),
        });
        Ok(())
    }

    fn write_bigtable(&self, spec: &BigtableSpec, _agent: &dyn Agent) -> anyhow::Result<()> {
        self.bigtable.lock().unwrap().push(spec.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingRecords {
    pub writes: Mutex<Vec<(PathBuf, GameRecord)>>,
}

impl GameRecordWriter for RecordingRecords {
    fn write_record(&self, path: &Path, record: &GameRecord) -> anyhow::Result<()> {
        assert!(path.parent().unwrap().is_dir());
        self.writes
            .lock()
            .unwrap()
            .push((path.to_path_buf(), record.clone()));
        Ok(())
    }
}

/// Reads records written as whitespace separated GTP vertices.
pub struct WhitespaceReader;

impl GameRecordReader for WhitespaceReader {
    fn main_line(&self, contents: &str) -> anyhow::Result<Vec<Move>> {
        contents
            .split_whitespace()
            .map(|vertex| Move::from_gtp(vertex, 19))
            .collect()
    }
}

pub struct Fakes {
    pub models: Arc<FakeModels>,
    pub agents: Arc<FakeAgents>,
    pub examples: Arc<RecordingExamples>,
    pub records: Arc<RecordingRecords>,
}

impl Fakes {
    pub fn new(game_length: usize) -> Self {
        Self::with_agents(FakeAgents::new(game_length))
    }

    pub fn with_agents(agents: FakeAgents) -> Self {
        Self {
            models: Arc::new(FakeModels::default()),
            agents: Arc::new(agents),
            examples: Arc::new(RecordingExamples::default()),
            records: Arc::new(RecordingRecords::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            models: self.models.clone(),
            agents: self.agents.clone(),
            examples: self.examples.clone(),
            records: self.records.clone(),
            record_reader: Arc::new(WhitespaceReader),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.collaborators(),
            Configuration::new().with_verbose(false),
        )
        .unwrap()
    }
}

/// Rewrite a flag file and push its modification time forward, so the next check sees a
/// change even on filesystems with coarse timestamps.
pub fn rewrite_flag_file(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
    let later = std::fs::metadata(path).unwrap().modified().unwrap() + Duration::from_secs(10);
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

/// GTP engine as a shell script. It names itself `fake-engine`, always generates `D4`,
/// and either accepts or refuses every `play`.
pub fn write_engine(dir: &Path, refuse_play: bool) -> String {
    let play = if refuse_play {
        "printf '? illegal move\\n\\n'"
    } else {
        "printf '= \\n\\n'"
    };
    let script = format!(
        r#"while read -r cmd rest; do
  case "$cmd" in
    name) printf '= fake-engine\n\n' ;;
    genmove) printf '= D4\n\n' ;;
    play) {play} ;;
    quit) printf '= \n\n'; exit 0 ;;
    *) printf '= \n\n' ;;
  esac
done
"#
    );
    let path = dir.join("engine.sh");
    std::fs::write(&path, script).unwrap();
    format!("sh {}", path.display())
}

/// Engine that exits right away.
pub fn write_dead_engine(dir: &Path) -> String {
    let path = dir.join("dead.sh");
    std::fs::write(&path, "exit 0\n").unwrap();
    format!("sh {}", path.display())
}
