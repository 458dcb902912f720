//! Flag file reloaded between self-play games.
//!
//! The file holds one `--name=value` assignment per line; `#` starts a comment and
//! blank lines are ignored:
//!
//! ```text
//! # tuned on the last generation
//! --resign_threshold=-0.95
//! --holdout_pct=0.05   # more validation data
//! ```
//!
//! The file is only read again when its modification time changed since the previous
//! check. A malformed line fails the whole reload: flags are never left partially
//! applied to a running job.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{ensure, Context};
use tracing::{debug, info};

use crate::flags::Flags;

/// Parse the contents of a flag file into `(name, value)` pairs, in file order.
pub fn parse_flag_lines(contents: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut assignments = vec![];
    for (i, line) in contents.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let Some(assignment) = line.strip_prefix("--").filter(|rest| !rest.is_empty()) else {
            anyhow::bail!("line {}: expected '--name=value', got '{line}'", i + 1);
        };
        let (name, value) = assignment.split_once('=').unwrap_or((assignment, ""));
        ensure!(!name.is_empty(), "line {}: missing flag name", i + 1);
        assignments.push((name.to_string(), value.to_string()));
    }
    Ok(assignments)
}

/// A flag file together with the modification time seen at the last check.
#[derive(Debug)]
pub struct FlagFile {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl FlagFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply the file to `flags` if it changed since the last call.
    ///
    /// Returns whether anything was applied.
    ///
    /// # Errors
    /// When the file cannot be read or one of its lines is malformed.
    pub fn maybe_reload(&mut self, flags: &mut Flags) -> anyhow::Result<bool> {
        self.maybe_reload_checked(flags, |_| Ok(()))
    }

    /// Like [`FlagFile::maybe_reload`], but `check` must accept the reloaded flags before
    /// they replace `flags`. A rejected reload leaves `flags` and the recorded
    /// modification time untouched, so the next call fails the same way.
    pub fn maybe_reload_checked<F>(&mut self, flags: &mut Flags, check: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&Flags) -> anyhow::Result<()>,
    {
        let modified = std::fs::metadata(&self.path)
            .and_then(|metadata| metadata.modified())
            .with_context(|| format!("could not stat flag file {}", self.path.display()))?;
        debug!(
            flag_file = %self.path.display(),
            old = ?self.last_modified,
            new = ?modified
        );
        if self.last_modified == Some(modified) {
            debug!("flag file unchanged, skipping");
            return Ok(false);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("could not read flag file {}", self.path.display()))?;
        let assignments = parse_flag_lines(&contents)
            .with_context(|| format!("malformed flag file {}", self.path.display()))?;

        let mut updated = flags.clone();
        for (name, value) in &assignments {
            info!("setting flag --{name}={value}");
            updated.set(name, value)?;
        }
        check(&updated)?;
        *flags = updated;
        self.last_modified = Some(modified);
        Ok(true)
    }
}
