//! Live, hot-reloadable configuration and the per-game snapshots taken from it.
//!
//! The live [`Flags`], the flag file's modification state and the shared random source
//! sit behind one mutex. Units never read the live flags directly: at the start of each
//! game they take a [`ConfigSnapshot`] under the lock, so a reload can change the next
//! game but never the one being played.

use std::sync::{Mutex, MutexGuard};

use anyhow::ensure;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agent::PlayerOptions;
use crate::flags::{unit_seed, Flags};
use crate::hot_reload::FlagFile;

/// Everything a unit needs for one game, frozen at game start.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub player: PlayerOptions,
    pub run_forever: bool,
    pub holdout_pct: f32,
    pub output_dir: String,
    pub holdout_dir: String,
    pub sgf_dir: String,
}

/// State guarded by the shared configuration lock.
pub struct LiveConfig {
    pub flags: Flags,
    flag_file: Option<FlagFile>,
    rng: StdRng,
}

impl LiveConfig {
    /// Reload the flag file if it changed.
    ///
    /// # Errors
    /// When the file is unreadable or malformed, or when it tries to change the model
    /// of a running job.
    pub fn maybe_reload(&mut self) -> anyhow::Result<bool> {
        let Some(flag_file) = self.flag_file.as_mut() else {
            return Ok(false);
        };
        let model = self.flags.model.clone();
        flag_file.maybe_reload_checked(&mut self.flags, |updated| {
            ensure!(
                model == updated.model,
                "changing the model during self-play is not supported ('{model}' -> '{}')",
                updated.model
            );
            Ok(())
        })
    }

    /// Snapshot the flags for the next game of `unit`.
    ///
    /// Draws from the shared random source whether resignation is enabled.
    pub fn snapshot(&mut self, unit: usize) -> ConfigSnapshot {
        let mut player = self.flags.player_options();
        player.verbose = unit == 0;
        player.random_seed = unit_seed(player.random_seed, unit);
        player.resign_enabled = self.rng.random::<f32>() >= self.flags.disable_resign_pct;

        ConfigSnapshot {
            player,
            run_forever: self.flags.run_forever,
            holdout_pct: self.flags.holdout_pct,
            output_dir: self.flags.output_dir.clone(),
            holdout_dir: self.flags.holdout_dir.clone(),
            sgf_dir: self.flags.sgf_dir.clone(),
        }
    }

    /// Independent draw against `holdout_pct`.
    pub fn draw_holdout(&mut self, holdout_pct: f32) -> bool {
        self.rng.random::<f32>() < holdout_pct
    }
}

/// The configuration lock shared by all self-play units.
pub struct SharedConfig {
    live: Mutex<LiveConfig>,
}

impl SharedConfig {
    /// Shared config seeded from the OS. The flag file named by `flags.flags_path` (if
    /// any) is applied on the first reload.
    pub fn new(flags: Flags) -> Self {
        Self::with_rng(flags, StdRng::from_os_rng())
    }

    pub fn with_seed(flags: Flags, seed: u64) -> Self {
        Self::with_rng(flags, StdRng::seed_from_u64(seed))
    }

    fn with_rng(flags: Flags, rng: StdRng) -> Self {
        let flag_file = (!flags.flags_path.is_empty()).then(|| FlagFile::new(&flags.flags_path));
        Self {
            live: Mutex::new(LiveConfig {
                flags,
                flag_file,
                rng,
            }),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, LiveConfig> {
        self.live.lock().expect("poisoned")
    }
}

#[cfg(test)]
mod snapshot_tests {
    use super::*;

    #[test]
    fn snapshot_perturbs_seed_per_unit() {
        let flags = Flags {
            seed: 10,
            ..Flags::default()
        };
        let shared = SharedConfig::with_seed(flags, 1);
        let mut live = shared.lock();
        assert_eq!(live.snapshot(0).player.random_seed, 10);
        assert_eq!(live.snapshot(3).player.random_seed, 10 + 3 * 1_299_283);
        assert!(live.snapshot(0).player.verbose);
        assert!(!live.snapshot(1).player.verbose);
    }

    #[test]
    fn resignation_follows_disable_pct() {
        let always = Flags {
            disable_resign_pct: 1.0,
            ..Flags::default()
        };
        let never = Flags {
            disable_resign_pct: 0.0,
            ..Flags::default()
        };
        let mut disabled = SharedConfig::with_seed(always, 7);
        let mut enabled = SharedConfig::with_seed(never, 7);
        for unit in 0..20 {
            assert!(!disabled.live.get_mut().unwrap().snapshot(unit).player.resign_enabled);
            assert!(enabled.live.get_mut().unwrap().snapshot(unit).player.resign_enabled);
        }
    }

    #[test]
    fn holdout_rate_matches_pct() {
        let shared = SharedConfig::with_seed(Flags::default(), 42);
        let mut live = shared.lock();
        let holdouts = (0..20_000).filter(|_| live.draw_holdout(0.25)).count();
        assert!((4_500..5_500).contains(&holdouts), "{holdouts}");
    }

    #[test]
    fn reload_without_flag_file_is_noop() {
        let shared = SharedConfig::with_seed(Flags::default(), 0);
        assert!(!shared.lock().maybe_reload().unwrap());
    }

    #[test]
    fn reload_refuses_model_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags");
        std::fs::write(&path, "--model=other.pb\n").unwrap();
        let flags = Flags {
            model: "first.pb".to_string(),
            flags_path: path.to_string_lossy().into_owned(),
            ..Flags::default()
        };
        let shared = SharedConfig::with_seed(flags, 0);
        let mut live = shared.lock();
        // every later unit must hit the same error on the unchanged file
        for _ in 0..3 {
            let err = live.maybe_reload().unwrap_err();
            assert!(err.to_string().contains("changing the model"), "{err:#}");
            assert_eq!(live.flags.model, "first.pb");
        }
    }
}
