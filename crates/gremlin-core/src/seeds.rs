//! Seed derivation for batches of sessions.
//!
//! Batch session `i` gets the `i`-th draw of a ChaCha8 stream seeded with
//! the master seed. Same master -> same batch seeds, always.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub fn derive_seeds(master: u64, count: usize) -> Vec<u32> {
    let mut rng = ChaCha8Rng::seed_from_u64(master);
    (0..count).map(|_| rng.next_u32()).collect()
}
