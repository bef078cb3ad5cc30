//! Seeded pseudo-random stream (mulberry32).
//!
//! The transform is fixed so that a seed reported from one run replays the
//! exact same draws anywhere, including implementations in other languages.
//! Same seed -> same stream, always.

use rand::{Error, RngCore, SeedableRng};

/// Increment applied to the state before each draw.
const STATE_INCREMENT: u32 = 0x6D2B79F5;

/// 2^32, the divisor mapping a 32-bit draw into [0, 1).
const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RandomError {
    #[error("invalid range: max ({max}) must be greater than min ({min})")]
    InvalidRange { min: i64, max: i64 },
}

/// Deterministic generator whose whole state is one `u32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeededRandom {
    state: u32,
}

impl SeededRandom {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Current internal state (the seed before the first draw).
    pub fn state(&self) -> u32 {
        self.state
    }

    fn mix(&mut self) -> u32 {
        self.state = self.state.wrapping_add(STATE_INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Next value in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.mix()) / TWO_POW_32
    }

    /// Integer in [min, max).
    pub fn next_int(&mut self, min: i64, max: i64) -> Result<i64, RandomError> {
        if max <= min {
            return Err(RandomError::InvalidRange { min, max });
        }
        // Widen so spans past i64::MAX do not overflow.
        let span = (i128::from(max) - i128::from(min)) as f64;
        let offset = (self.next_f64() * span).floor() as i128;
        let value = (i128::from(min) + offset).min(i128::from(max) - 1);
        Ok(value as i64)
    }

    /// Uniformly chosen element, or `None` for an empty slice.
    ///
    /// An empty slice consumes no draw.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let index = self.next_int(0, items.len() as i64).ok()?;
        items.get(index as usize)
    }

    /// In-place Fisher-Yates shuffle, walking from the last index down to 1.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            if let Ok(j) = self.next_int(0, i as i64 + 1) {
                items.swap(i, j as usize);
            }
        }
    }
}

/// Map a pre-drawn roll in [0, 1) onto an index of a list of `len` items.
///
/// Same arithmetic as [`SeededRandom::pick`], for callers that must draw
/// before they know how many candidates exist.
pub fn index_for_roll(roll: f64, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let index = (roll * len as f64).floor() as usize;
    Some(index.min(len - 1))
}

impl RngCore for SeededRandom {
    fn next_u32(&mut self) -> u32 {
        self.mix()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.mix());
        let lo = u64::from(self.mix());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.mix().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for SeededRandom {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}
