//! Seedable pseudo-random source for the cost-model search.
//!
//! Xorshift64* is small, fast and fully reproducible from a seed, which is
//! all the stochastic matcher needs. The generator is owned by one run's
//! parameters and threaded through explicitly; there is no global state.

/// Xorshift64* generator.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    /// A zero state is a fixed point of xorshift, so it is replaced by a
    /// non-zero constant.
    pub fn seed_from(seed: u64) -> Self {
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform in `[0, bound)`; zero when `bound` is zero.
    pub fn below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            (self.next_u64() % bound as u64) as usize
        }
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Fisher-Yates shuffle.
    pub fn shuffle<X>(&mut self, items: &mut [X]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }

    /// Number of failed trials before the first success, each trial
    /// succeeding with probability `p` (a Pascal distribution with r = 1).
    pub fn geometric(&mut self, p: f64) -> usize {
        if p >= 1.0 {
            return 0;
        }
        let mut failures = 0;
        while !self.chance(p) {
            failures += 1;
        }
        failures
    }
}
