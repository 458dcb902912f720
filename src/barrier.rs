//! A reusable barrier whose cohort can shrink between rounds.
//!
//! Unlike [`std::sync::Barrier`], the number of required arrivals may be lowered while
//! units are waiting. This is what lets a cohort of games finish at different move
//! counts: a unit whose game is over calls [`ReusableBarrier::decrement_required`] and
//! the remaining units stop waiting for it.

use std::sync::{Condvar, Mutex};

#[derive(Debug)]
struct BarrierState {
    required: usize,
    arrived: usize,
    generation: u64,
}

impl BarrierState {
    fn release(&mut self) {
        self.generation += 1;
        self.arrived = 0;
    }
}

/// Blocks a cohort of units until all of them arrived, then releases them together.
#[derive(Debug)]
pub struct ReusableBarrier {
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl ReusableBarrier {
    /// Create a barrier waiting for `required` units per round.
    pub fn new(required: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                required,
                arrived: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        }
    }

    /// Block until `required` units called `wait` since the last release.
    ///
    /// Returns the generation the caller was released into.
    ///
    /// # Panics
    ///
    /// Panics if more units arrive than are required, which can only be caused by a
    /// caller that kept waiting after giving up its place.
    pub fn wait(&self) -> u64 {
        let mut state = self.state.lock().expect("poisoned");
        state.arrived += 1;
        assert!(
            state.arrived <= state.required,
            "barrier over-arrival: {} arrived, {} required",
            state.arrived,
            state.required
        );

        if state.arrived == state.required {
            state.release();
            self.released.notify_all();
            return state.generation;
        }

        let generation = state.generation;
        while state.generation == generation {
            state = self.released.wait(state).expect("poisoned");
        }
        state.generation
    }

    /// Permanently remove one unit from the cohort.
    ///
    /// Releases the current round if every remaining unit already arrived.
    pub fn decrement_required(&self) {
        let mut state = self.state.lock().expect("poisoned");
        assert!(state.required > 0, "barrier has no participant left");
        state.required -= 1;
        if state.arrived == state.required {
            state.release();
            self.released.notify_all();
        }
    }

    /// Number of arrivals needed to release a round.
    pub fn required(&self) -> usize {
        self.state.lock().expect("poisoned").required
    }

    /// Number of completed rounds.
    pub fn generation(&self) -> u64 {
        self.state.lock().expect("poisoned").generation
    }
}

/// Leaves the barrier cohort when dropped, on every exit path of a unit.
pub struct BarrierMembership<'a> {
    barrier: &'a ReusableBarrier,
}

impl<'a> BarrierMembership<'a> {
    pub fn new(barrier: &'a ReusableBarrier) -> Self {
        Self { barrier }
    }

    pub fn wait(&self) -> u64 {
        self.barrier.wait()
    }
}

impl Drop for BarrierMembership<'_> {
    fn drop(&mut self) {
        self.barrier.decrement_required();
    }
}
