//! Seed drawing and the seeding policy for splits and fits.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SeedMode;

/// Seed used by every fit in [`SeedMode::Static`].
pub const STATIC_MODEL_SEED: u64 = 42;

/// Exclusive upper bound of freshly drawn seeds (`i32::MAX`).
pub const SEED_UPPER_BOUND: u64 = i32::MAX as u64;

/// RNG handle used by the orchestrator to draw shuffle and model seeds.
///
/// Seeds are drawn before a unit runs so the unit's output keys are known up
/// front. Tests construct the handle from a fixed seed; the CLI seeds it from
/// the operating system.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
}

impl RngHandle {
    /// Creates a deterministic handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a handle seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Draws a seed uniformly from `[0, i32::MAX)`.
    pub fn draw_seed(&mut self) -> u64 {
        self.rng.gen_range(0..SEED_UPPER_BOUND)
    }
}

/// Where the seed for a split or fit comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedRequest {
    /// Draw a new seed.
    Fresh,
    /// Reuse a previously recorded seed verbatim.
    Replay(u64),
}

impl SeedRequest {
    /// Turns the request into a concrete seed, drawing from `rng` when fresh.
    pub fn resolve(self, rng: &mut RngHandle) -> u64 {
        match self {
            SeedRequest::Fresh => rng.draw_seed(),
            SeedRequest::Replay(seed) => seed,
        }
    }
}

/// Concrete model seed for a fit under `mode`.
///
/// Static mode ignores the request entirely.
pub fn model_seed(mode: SeedMode, request: SeedRequest, rng: &mut RngHandle) -> u64 {
    match mode {
        SeedMode::Static => STATIC_MODEL_SEED,
        SeedMode::Random => request.resolve(rng),
    }
}
