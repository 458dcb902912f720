use std::io::{BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::{trace, warn};

/// An external engine process talking over its stdin/stdout.
///
/// Both pipes are closed and the child is reaped (killed if it does not exit on its own)
/// when the value is dropped, whatever path the owning unit leaves by.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: Option<BufReader<ChildStdout>>,
    cleaned_up: bool,
}

impl EngineProcess {
    const EXIT_GRACE: Duration = Duration::from_secs(1);

    /// Spawn `command_line`, split on whitespace into program and arguments.
    pub fn launch(command_line: &str) -> anyhow::Result<EngineProcess> {
        let mut words = command_line.split_whitespace();
        let Some(program) = words.next() else {
            bail!("empty engine command line");
        };
        let args: Vec<&str> = words.collect();
        Self::launch_with_args(program, &args)
    }

    pub fn launch_with_args(program: &str, args: &[&str]) -> anyhow::Result<EngineProcess> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("could not launch engine '{program}'"))?;

        let stdin = child.stdin.take().context("engine stdin not captured")?;
        let stdout = child.stdout.take().context("engine stdout not captured")?;
        trace!(pid = child.id(), program, "engine launched");

        Ok(EngineProcess {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: Some(BufReader::new(stdout)),
            cleaned_up: false,
        })
    }

    /// Send one line (a newline is appended) and flush it.
    pub fn send_line(&mut self, line: &str) -> anyhow::Result<()> {
        let stdin = self.stdin.as_mut().context("engine stdin already closed")?;
        writeln!(stdin, "{line}")
            .and_then(|_| stdin.flush())
            .with_context(|| format!("could not send '{line}' to engine"))
    }

    /// Reader over the engine's stdout.
    pub fn reader(&mut self) -> anyhow::Result<&mut BufReader<ChildStdout>> {
        self.stdout.as_mut().context("engine stdout already closed")
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Close both pipes, give the engine `max_duration` to exit, then kill it.
    pub fn shutdown(&mut self, max_duration: Duration) -> anyhow::Result<()> {
        self.stdin.take();
        self.stdout.take();

        let deadline = Instant::now() + max_duration;
        loop {
            if let Some(status) = self.child.try_wait().context("could not poll engine")? {
                trace!(pid = self.child.id(), %status, "engine exited");
                self.cleaned_up = true;
                return Ok(());
            }
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(10).min(max_duration / 10));
        }

        self.child.kill().context("could not kill engine")?;
        self.child.wait().context("could not reap engine")?;
        self.cleaned_up = true;
        Ok(())
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if !self.cleaned_up {
            if let Err(e) = self.shutdown(Self::EXIT_GRACE) {
                warn!("could not clean up engine process {}: {e:#}", self.child.id());
            }
        }
    }
}
