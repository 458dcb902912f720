//! Colors, board coordinates and moves, with their GTP text form.

use std::fmt::Display;

use anyhow::{bail, Context};

/// Column letters used by GTP vertices. `I` is skipped.
const COLUMNS: &str = "ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// Default board size.
pub const DEFAULT_BOARD_SIZE: usize = 19;

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn other(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Parse a GTP color (`b`, `black`, `w`, `white`, any case).
    pub fn from_gtp(s: &str) -> anyhow::Result<Color> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Ok(Color::Black),
            "w" | "white" => Ok(Color::White),
            _ => bail!("invalid color '{s}'"),
        }
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::Black => write!(f, "b"),
            Color::White => write!(f, "w"),
        }
    }
}

/// A point on the board. Row 0 is the top row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// What an agent can do on its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Play(Coord),
    Pass,
    Resign,
}

impl Move {
    /// GTP vertex (`D4`, `pass`, `resign`).
    pub fn to_gtp(self, board_size: usize) -> String {
        match self {
            Move::Pass => "pass".to_string(),
            Move::Resign => "resign".to_string(),
            Move::Play(Coord { row, col }) => {
                let letter = COLUMNS.as_bytes().get(col).copied().unwrap_or(b'?') as char;
                format!("{letter}{}", board_size.saturating_sub(row))
            }
        }
    }

    /// Parse a GTP vertex, case-insensitively.
    ///
    /// # Errors
    /// When the text is not `pass`, `resign` or a vertex that fits on the board.
    pub fn from_gtp(s: &str, board_size: usize) -> anyhow::Result<Move> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("pass") {
            return Ok(Move::Pass);
        }
        if s.eq_ignore_ascii_case("resign") {
            return Ok(Move::Resign);
        }

        let mut chars = s.chars();
        let letter = chars
            .next()
            .context("empty vertex")?
            .to_ascii_uppercase();
        let col = COLUMNS
            .find(letter)
            .with_context(|| format!("invalid column in '{s}'"))?;
        let number: usize = chars
            .as_str()
            .parse()
            .with_context(|| format!("invalid row in '{s}'"))?;
        if col >= board_size || number == 0 || number > board_size {
            bail!("'{s}' is outside a {board_size}x{board_size} board");
        }
        Ok(Move::Play(Coord::new(board_size - number, col)))
    }
}
