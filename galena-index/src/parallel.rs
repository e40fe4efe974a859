//! Worker identity and per-worker counters over the rayon runtime.
//!
//! The engine assumes a work-stealing parallel-for and a stable worker-id
//! facility; both come from rayon. Threads outside the pool (for example the
//! caller's thread joining a `par_iter`) map to one extra trailing slot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of counter slots needed to cover every possible worker.
pub(crate) fn num_workers() -> usize {
    rayon::current_num_threads() + 1
}

/// Identifier of the calling worker, in `0..num_workers()`.
pub(crate) fn worker_id() -> usize {
    rayon::current_thread_index().unwrap_or_else(rayon::current_num_threads)
}

/// Worker-indexed counter array. Each worker bumps its own slot with relaxed
/// ordering; slots are only merged when reporting, so there is no shared
/// cache line ping-pong on the hot path beyond the slot itself.
#[derive(Debug)]
pub struct WorkerCounter {
    slots: Vec<AtomicU64>,
}

impl WorkerCounter {
    pub(crate) fn new() -> Self {
        let slots = (0..num_workers()).map(|_| AtomicU64::new(0)).collect();
        Self { slots }
    }

    pub(crate) fn add(&self, delta: u64) {
        let slot = worker_id().min(self.slots.len() - 1);
        self.slots[slot].fetch_add(delta, Ordering::Relaxed);
    }

    /// Sum across all worker slots.
    pub fn total(&self) -> u64 {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }

    pub(crate) fn reset(&self) {
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }
}

/// Counters accumulated by layer searches, merged on read.
#[derive(Debug)]
pub struct SearchStats {
    /// Distance computations performed.
    pub visited: WorkerCounter,
    /// Vertices consumed from unvisited frontiers.
    pub evaluated: WorkerCounter,
    /// Sizes of returned frontiers.
    pub frontier: WorkerCounter,
}

impl SearchStats {
    pub(crate) fn new() -> Self {
        Self {
            visited: WorkerCounter::new(),
            evaluated: WorkerCounter::new(),
            frontier: WorkerCounter::new(),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.visited.reset();
        self.evaluated.reset();
        self.frontier.reset();
    }
}
