//! Seeded randomness. Uses `ChaCha8Rng` rather than the teacher's `StdRng`
//! because `StdRng`'s algorithm is not guaranteed stable across `rand`
//! releases, and this crate promises byte-exact reproduction for a fixed
//! seed across runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Root seed for a single `fit` call. Deterministic sub-streams are derived
/// from `(round, class, node_id)` triples so that reordering work across
/// threads never changes which draws a given node consumes.
#[derive(Debug, Clone, Copy)]
pub struct SeedSource {
    root: u64,
}

impl SeedSource {
    /// A fixed root seed, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self { root: seed }
    }

    /// A nondeterministic root seed drawn from the OS entropy source.
    pub fn from_entropy() -> Self {
        Self {
            root: rand::thread_rng().gen(),
        }
    }

    /// Derives the sub-stream rng for a single node's split/noise draws.
    ///
    /// Mixes `(round, class, node_id)` into the root seed with a
    /// splitmix-style finalizer so nearby keys produce unrelated streams.
    pub fn stream_for(&self, round: usize, class: usize, node_id: u64) -> ChaCha8Rng {
        let mut x = self.root;
        x = x.wrapping_add(splitmix64(round as u64));
        x = x.wrapping_add(splitmix64((class as u64) ^ 0x9E3779B97F4A7C15));
        x = x.wrapping_add(splitmix64(node_id ^ 0xBF58476D1CE4E5B9));
        ChaCha8Rng::seed_from_u64(splitmix64(x))
    }

    /// Derives the rng used for row subsampling / partitioning at the start
    /// of a round, keyed only by `round` (no node exists yet).
    pub fn stream_for_round(&self, round: usize) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.root.wrapping_add(splitmix64(round as u64)))
    }
}

/// Steele/Lea/Flood's splitmix64 finalizer, used purely as a deterministic
/// integer hash to decorrelate the `(round, class, node_id)` key space.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
