//! Go Text Protocol front-end: serves one local agent to a GTP controller.
//!
//! Commands are read line by line; every command gets exactly one `= ...` or `? ...`
//! response terminated by an empty line, echoing the command id when one was given.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use tracing::{debug, trace};

use crate::agent::{Agent, AgentFactory, PlayerOptions};
use crate::coord::{Color, Move};
use crate::inference::BatchingFactory;

const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "clear_board",
    "final_score",
    "genmove",
    "known_command",
    "komi",
    "list_commands",
    "name",
    "play",
    "protocol_version",
    "quit",
    "version",
];

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Command {
    id: Option<u32>,
    name: String,
    args: Vec<String>,
}

impl Command {
    /// `None` for lines that hold no command (blank or comment only).
    fn parse(line: &str) -> Option<Command> {
        let line = line.split('#').next().unwrap_or_default();
        let mut words = line.split_whitespace().peekable();
        let id = words.peek().and_then(|word| word.parse().ok());
        if id.is_some() {
            words.next();
        }
        let name = words.next()?.to_ascii_lowercase();
        Some(Command {
            id,
            name,
            args: words.map(str::to_string).collect(),
        })
    }

    fn arg(&self, index: usize) -> anyhow::Result<&str> {
        self.args
            .get(index)
            .map(String::as_str)
            .with_context(|| format!("missing argument {} of '{}'", index + 1, self.name))
    }
}

pub struct GtpServer {
    agents: Arc<dyn AgentFactory>,
    factory: BatchingFactory,
    options: PlayerOptions,
    courtesy_pass: bool,
    agent: Box<dyn Agent>,
}

impl GtpServer {
    pub fn new(
        agents: Arc<dyn AgentFactory>,
        factory: BatchingFactory,
        options: PlayerOptions,
        courtesy_pass: bool,
    ) -> anyhow::Result<Self> {
        let agent = agents.new_agent(Box::new(factory.new_handle()), &options)?;
        Ok(Self {
            agents,
            factory,
            options,
            courtesy_pass,
            agent,
        })
    }

    /// Answer commands from `input` until `quit` or end of input.
    ///
    /// # Errors
    /// Only on I/O failures; failing commands are answered with `?`.
    pub fn serve<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> anyhow::Result<()> {
        for line in input.lines() {
            let line = line.context("could not read GTP command")?;
            let Some(command) = Command::parse(&line) else {
                continue;
            };
            trace!(?command);

            let id = command.id.map(|id| id.to_string()).unwrap_or_default();
            let response = match self.handle(&command) {
                Ok(payload) => format!("={id} {payload}\n\n"),
                Err(e) => {
                    debug!("'{line}' failed: {e:#}");
                    format!("?{id} {e}\n\n")
                }
            };
            output
                .write_all(response.as_bytes())
                .and_then(|_| output.flush())
                .context("could not write GTP response")?;

            if command.name == "quit" {
                break;
            }
        }
        Ok(())
    }

    fn handle(&mut self, command: &Command) -> anyhow::Result<String> {
        match command.name.as_str() {
            "protocol_version" => Ok("2".to_string()),
            "name" => Ok(self.options.name.clone()),
            "version" => Ok(env!("CARGO_PKG_VERSION").to_string()),
            "known_command" => {
                let known = KNOWN_COMMANDS.contains(&command.arg(0)?);
                Ok(known.to_string())
            }
            "list_commands" => Ok(KNOWN_COMMANDS.join("\n")),
            "quit" => Ok(String::new()),
            "boardsize" => {
                let size: usize = command.arg(0)?.parse().context("unacceptable size")?;
                ensure!((2..=25).contains(&size), "unacceptable size");
                self.options.board_size = size;
                self.reset(&[])?;
                Ok(String::new())
            }
            "clear_board" => {
                self.reset(&[])?;
                Ok(String::new())
            }
            "komi" => {
                self.options.komi = command.arg(0)?.parse().context("syntax error")?;
                let moves: Vec<Move> = self.agent.history().iter().map(|r| r.mv).collect();
                self.reset(&moves)?;
                Ok(String::new())
            }
            "play" => {
                let color = Color::from_gtp(command.arg(0)?)?;
                let mv = Move::from_gtp(command.arg(1)?, self.options.board_size)?;
                ensure!(color == self.agent.to_play(), "playing out of turn is not supported");
                self.agent.play_move(mv).context("illegal move")?;
                Ok(String::new())
            }
            "genmove" => {
                let color = Color::from_gtp(command.arg(0)?)?;
                ensure!(color == self.agent.to_play(), "playing out of turn is not supported");
                ensure!(!self.agent.is_game_over(), "game is over");
                let opponent_passed = self
                    .agent
                    .history()
                    .last()
                    .is_some_and(|record| record.mv == Move::Pass);
                let mv = if self.courtesy_pass && opponent_passed {
                    Move::Pass
                } else {
                    self.agent.suggest_move()?
                };
                self.agent.play_move(mv)?;
                Ok(mv.to_gtp(self.options.board_size))
            }
            "final_score" => {
                ensure!(self.agent.is_game_over(), "game is not over");
                Ok(self.agent.result_string())
            }
            _ => bail!("unknown command"),
        }
    }

    /// Start a new game with the current options, replaying `moves`.
    fn reset(&mut self, moves: &[Move]) -> anyhow::Result<()> {
        let mut agent = self
            .agents
            .new_agent(Box::new(self.factory.new_handle()), &self.options)?;
        for &mv in moves {
            agent.play_move(mv)?;
        }
        self.agent = agent;
        Ok(())
    }
}
