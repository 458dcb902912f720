//! Fixed-size cohorts of OS threads.
//!
//! Every mode runs its units through a [`TaskGroup`]: exactly one thread per unit,
//! spawned once and joined once. The first unit to fail (or panic) marks the group as
//! aborted; long-running units poll [`TaskGroup::aborted`] to wind down. Once every unit
//! returned, the earliest failure is reported.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use anyhow::{anyhow, Context};
use tracing::{error, trace};

pub struct TaskGroup {
    name: String,
    aborted: AtomicBool,
    first_error: Mutex<Option<anyhow::Error>>,
}

impl TaskGroup {
    /// Threads are named `<name>-<unit>`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aborted: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    /// Whether a unit of the current run already failed.
    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Run `units` copies of `task`, each receiving its unit index.
    pub fn run<F>(&self, units: usize, task: F) -> anyhow::Result<()>
    where
        F: Fn(usize) -> anyhow::Result<()> + Sync,
    {
        self.run_each((0..units).collect(), |unit, _| task(unit))
    }

    /// Run one unit per item, moving the item into its unit.
    pub fn run_each<T, F>(&self, items: Vec<T>, task: F) -> anyhow::Result<()>
    where
        T: Send,
        F: Fn(usize, T) -> anyhow::Result<()> + Sync,
    {
        self.aborted.store(false, Ordering::Release);
        let task = &task;
        thread::scope(|s| {
            let handles: Vec<_> = items
                .into_iter()
                .enumerate()
                .filter_map(|(unit, item)| {
                    let spawned = thread::Builder::new()
                        .name(format!("{}-{unit}", self.name))
                        .spawn_scoped(s, move || self.run_unit(unit, || task(unit, item)))
                        .with_context(|| format!("could not spawn {}-{unit}", self.name));
                    match spawned {
                        Ok(handle) => Some((unit, handle)),
                        Err(e) => {
                            self.fail(unit, e);
                            None
                        }
                    }
                })
                .collect();

            for (unit, handle) in handles {
                if handle.join().is_err() {
                    self.fail(unit, anyhow!("{}-{unit} panicked", self.name));
                }
            }
        });

        match self.first_error.lock().expect("poisoned").take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn run_unit(&self, unit: usize, task: impl FnOnce() -> anyhow::Result<()>) {
        let result = panic::catch_unwind(AssertUnwindSafe(task))
            .unwrap_or_else(|_| Err(anyhow!("{}-{unit} panicked", self.name)));
        match result {
            Ok(()) => trace!("{}-{unit} done", self.name),
            Err(e) => self.fail(unit, e),
        }
    }

    fn fail(&self, unit: usize, e: anyhow::Error) {
        error!("{}-{unit} failed: {e:#}", self.name);
        self.aborted.store(true, Ordering::Release);
        self.first_error.lock().expect("poisoned").get_or_insert(e);
    }
}
