//! Geometric level sampling.

use crate::parallel;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;

thread_local! {
    static LEVEL_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Draw a node level from the geometric distribution induced by `m_l`:
/// `floor(-ln(u) * m_l)` with `u` uniform in `(0, 1]`.
///
/// Each worker owns a generator seeded from its worker id at first use, so a
/// fixed worker count reproduces the same stream of draws per worker. Runs
/// with different pool sizes draw different levels.
pub(crate) fn sample_level(m_l: f32) -> u32 {
    LEVEL_RNG.with(|cell| {
        let mut slot = cell.borrow_mut();
        let rng = slot
            .get_or_insert_with(|| StdRng::seed_from_u64(parallel::worker_id() as u64));
        let u: f32 = rng.random_range(f32::MIN_POSITIVE..=1.0);
        (-u.ln() * m_l) as u32
    })
}
