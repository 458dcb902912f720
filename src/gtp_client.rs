//! Client side of the Go Text Protocol, talking to an external engine process.

use std::io::BufRead;

use anyhow::{bail, Context};
use tracing::{debug, trace};

use crate::coord::{Color, Move};
use crate::engine_process::EngineProcess;

/// Read one GTP response.
///
/// Lines are read until one starts with `=` (success: the rest of the line, trimmed, is
/// returned) or `?` (failure: `None`). Blank and unrelated lines are skipped.
///
/// # Errors
/// When the stream ends before a response, i.e. the engine is gone.
pub fn read_response<R: BufRead>(reader: &mut R) -> anyhow::Result<Option<String>> {
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader
            .read_line(&mut line)
            .context("could not read engine response")?;
        if n == 0 {
            bail!("engine closed its output before responding");
        }
        let response = line.trim_start();
        if let Some(payload) = response.strip_prefix('=') {
            return Ok(Some(payload.trim().to_string()));
        }
        if response.starts_with('?') {
            trace!(response = response.trim_end(), "engine refused");
            return Ok(None);
        }
    }
}

/// One external engine, playing one game.
///
/// Tracks whose turn the engine believes it is: the color only advances when the engine
/// accepted a move or generated one.
pub struct GtpClient {
    engine: EngineProcess,
    color: Color,
    board_size: usize,
}

impl GtpClient {
    /// Launch `command_line` and set up the board.
    ///
    /// # Errors
    /// When the engine cannot be launched or refuses the board size or komi.
    pub fn launch(command_line: &str, board_size: usize, komi: f32) -> anyhow::Result<GtpClient> {
        let engine = EngineProcess::launch(command_line)?;
        debug!(pid = engine.id(), command_line, "engine started");
        let mut client = GtpClient {
            engine,
            color: Color::Black,
            board_size,
        };
        for command in [format!("boardsize {board_size}"), format!("komi {komi}")] {
            client
                .send(&command)?
                .with_context(|| format!("engine refused '{command}'"))?;
        }
        Ok(client)
    }

    /// Send one command. `None` means the engine answered with a failure.
    pub fn send(&mut self, command: &str) -> anyhow::Result<Option<String>> {
        self.engine.send_line(command)?;
        read_response(self.engine.reader()?)
            .with_context(|| format!("no response to '{command}'"))
    }

    /// Tell the engine about our move. `false` when it refused the move.
    pub fn play(&mut self, mv: Move) -> anyhow::Result<bool> {
        let command = format!("play {} {}", self.color, mv.to_gtp(self.board_size));
        let accepted = self.send(&command)?.is_some();
        if accepted {
            self.color = self.color.other();
        }
        Ok(accepted)
    }

    /// Ask the engine for its move. A refusal or an unreadable vertex resigns.
    pub fn gen_move(&mut self) -> anyhow::Result<Move> {
        let command = format!("genmove {}", self.color);
        let mv = match self.send(&command)? {
            Some(vertex) => match Move::from_gtp(&vertex, self.board_size) {
                Ok(mv) => mv,
                Err(e) => {
                    debug!("engine answered '{vertex}' to '{command}': {e:#}");
                    return Ok(Move::Resign);
                }
            },
            None => return Ok(Move::Resign),
        };
        self.color = self.color.other();
        Ok(mv)
    }

    /// The engine's name, `<unknown>` if it does not say.
    pub fn name(&mut self) -> anyhow::Result<String> {
        Ok(self
            .send("name")?
            .unwrap_or_else(|| "<unknown>".to_string()))
    }

    /// Color the engine expects next.
    pub fn color(&self) -> Color {
        self.color
    }
}
