//! Protocol jitter generator
//!
//! A linear congruential generator reseeded with caller entropy before
//! every draw. Given the same starting seed and the same entropy sequence it
//! produces the same values, which keeps protocol test vectors reproducible.
//! Not suitable for anything security related.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

/// LCG multiplier
pub const LCG_MULTIPLIER: u32 = 1_664_525;

/// LCG increment
pub const LCG_INCREMENT: u32 = 1_013_904_223;

/// Supplies entropy to mix into the generator
pub trait EntropySource {
    /// Returns the next entropy word
    fn entropy(&mut self) -> u32;
}

/// Entropy from the thread-local generator of `rand`
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngEntropy;

impl EntropySource for ThreadRngEntropy {
    fn entropy(&mut self) -> u32 {
        rand::thread_rng().gen()
    }
}

/// Fixed entropy, for reproducible sequences
impl EntropySource for u32 {
    fn entropy(&mut self) -> u32 {
        *self
    }
}

/// Seed state shared by every draw
#[derive(Debug, Default)]
pub struct SeedGenerator {
    seed: AtomicU32,
}

impl SeedGenerator {
    /// Creates a generator with seed zero
    pub const fn new() -> Self {
        SeedGenerator {
            seed: AtomicU32::new(0),
        }
    }

    /// Creates a generator starting from `seed`
    pub const fn with_seed(seed: u32) -> Self {
        SeedGenerator {
            seed: AtomicU32::new(seed),
        }
    }

    /// Current seed, which is also the full value of the last draw
    pub fn seed(&self) -> u32 {
        self.seed.load(Ordering::Relaxed)
    }

    /// Mixes `entropy` into the seed, steps the generator and returns the
    /// low 16 bits of the new seed
    pub fn draw(&self, entropy: u32) -> u16 {
        let previous = self
            .seed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |seed| {
                Some(step(seed, entropy))
            })
            .unwrap_or_else(|seed| seed);
        (step(previous, entropy) & 0xFFFF) as u16
    }

    /// Draws with entropy pulled from `source`
    pub fn draw_from<E: EntropySource + ?Sized>(&self, source: &mut E) -> u16 {
        self.draw(source.entropy())
    }

    /// Puts the generator back to seed zero
    pub fn reset(&self) {
        self.seed.store(0, Ordering::Relaxed);
    }
}

fn step(seed: u32, entropy: u32) -> u32 {
    seed.wrapping_add(entropy)
        .wrapping_mul(LCG_MULTIPLIER)
        .wrapping_add(LCG_INCREMENT)
}
