//! Runtime behavior of the orchestrator itself
//!
//! This module covers how a run reports what it does, not what it plays: game knobs live in
//! [`Flags`](crate::flags::Flags).
//!
//! Build one with [`Configuration::new()`] and the `with_*` setters, or pick it up from the
//! process environment with [`Configuration::from_env()`].
//!
//! # Variables
//!
//! Every variable is optional. Boolean ones are on only for `"true"`, in any case.
//!
//! - `ARENA_VERBOSE`: print final reports to stderr (default: `true`)
//! - `ARENA_LOG`: log to a file (default: `false`)
//! - `ARENA_LOG_DIR`: directory of the log file (default: current directory)

use std::path::PathBuf;

/// Reporting and logging switches of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) log_dir: Option<PathBuf>,
}

impl Configuration {
    /// Reports go to stderr, nothing is logged to a file.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            log_dir: None,
        }
    }

    /// Reads the `ARENA_*` variables.
    ///
    /// Any value other than `"true"` disables a boolean flag; unset variables keep the
    /// default. An empty `ARENA_LOG_DIR` is ignored.
    pub fn from_env() -> Self {
        fn flag(name: &str, default: bool) -> bool {
            std::env::var(name).map_or(default, |value| value.eq_ignore_ascii_case("true"))
        }

        Self {
            verbose: flag("ARENA_VERBOSE", true),
            log: flag("ARENA_LOG", false),
            log_dir: std::env::var_os("ARENA_LOG_DIR")
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Enable or disable printing reports.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Mirror every event into a log file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Directory of the log file.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod configuration_tests {
    use super::*;

    #[test]
    fn builders_override_defaults() {
        let config = Configuration::new()
            .with_verbose(false)
            .with_log(true)
            .with_log_dir("/tmp/logs");
        assert!(!config.verbose);
        assert!(config.log);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert_eq!(Configuration::default(), Configuration::new());
    }
}
