use std::fmt::Display;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

/// Win counters of one model, updated concurrently by every unit.
#[derive(Debug, Default)]
pub struct EvalResults {
    name: OnceLock<String>,
    black_wins: AtomicU32,
    white_wins: AtomicU32,
}

impl EvalResults {
    pub fn new(name: impl Into<String>) -> Self {
        let results = Self::default();
        let _ = results.name.set(name.into());
        results
    }

    /// Results whose name is only known once a unit asked for it.
    pub fn unnamed() -> Self {
        Self::default()
    }

    /// Set the name if none was set yet.
    pub fn set_name(&self, name: impl Into<String>) {
        let _ = self.name.set(name.into());
    }

    pub fn name(&self) -> &str {
        self.name.get().map(String::as_str).unwrap_or_default()
    }

    pub fn add_black_win(&self) {
        self.black_wins.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_white_win(&self) {
        self.white_wins.fetch_add(1, Ordering::Relaxed);
    }

    /// Plain copy of the counters, read once all units joined.
    pub fn score(&self) -> ModelScore {
        ModelScore {
            name: self.name().to_string(),
            black_wins: self.black_wins.load(Ordering::Relaxed),
            white_wins: self.white_wins.load(Ordering::Relaxed),
        }
    }
}

/// Final wins of one model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelScore {
    pub name: String,
    pub black_wins: u32,
    pub white_wins: u32,
}

impl ModelScore {
    pub fn total_wins(&self) -> u32 {
        self.black_wins + self.white_wins
    }
}

/// Outcome of an evaluation: two models over `num_games` games.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalReport {
    pub num_games: usize,
    pub first: ModelScore,
    pub second: ModelScore,
}

impl Display for EvalReport {
    /// ```text
    /// Wins        Total         Black         White
    /// a     3  75.00%     2  50.00%     1  25.00%
    /// b     1  25.00%     1  25.00%     0   0.00%
    ///                     3  75.00%     1  25.00%
    /// ```
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.first.name.len().max(self.second.name.len());
        let num_games = self.num_games.max(1) as f32;
        let wins = |n: u32| format!(" {n:5} {:6.2}%", n as f32 * 100.0 / num_games);

        writeln!(
            f,
            "{:<width$}        Total         Black         White",
            "Wins"
        )?;
        for score in [&self.first, &self.second] {
            writeln!(
                f,
                "{:<width$}{}{}{}",
                score.name,
                wins(score.total_wins()),
                wins(score.black_wins),
                wins(score.white_wins)
            )?;
        }
        write!(
            f,
            "{:<width$}              {}{}",
            "",
            wins(self.first.black_wins + self.second.black_wins),
            wins(self.first.white_wins + self.second.white_wins)
        )
    }
}
