//! Seeded pseudo-random stream and the distributions the kernel draws from.
//!
//! One [`SimRng`] is owned per simulation replica, seeded at construction.
//! Given the same seed, the same sequence of samples is drawn in the same
//! order — `StdRng` (a specific, fixed PCG-family generator) is deterministic
//! across platforms, so reproducibility falls out of `rand`'s contract
//! rather than anything bespoke here.

use rand::distr::Uniform;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Exp, Normal};

/// Deterministic sampling stream for one simulation instance.
///
/// No global or ambient randomness is permitted in the kernel — every
/// sample is drawn through an explicit `&mut SimRng`.
pub struct SimRng {
    inner: StdRng,
}

impl SimRng {
    /// Seeds a new stream.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws an exponential inter-arrival time with the given mean.
    ///
    /// `Exp` is parameterized by rate `1/mean`; `mean <= 0.0` returns `0.0`
    /// rather than constructing an invalid distribution.
    pub fn exponential(&mut self, mean: f64) -> f64 {
        if mean <= 0.0 {
            return 0.0;
        }
        let dist = Exp::new(1.0 / mean).expect("rate is finite and positive");
        dist.sample(&mut self.inner)
    }

    /// Draws from a triangular distribution with lower bound `a`, mode `c`,
    /// and upper bound `b` (`a <= c <= b`). The degenerate case `a == c ==
    /// b` returns `a` without touching the RNG stream.
    pub fn triangular(&mut self, a: f64, c: f64, b: f64) -> f64 {
        debug_assert!(a <= c && c <= b, "triangular bounds must be ordered");
        if a == b {
            return a;
        }
        let u: f64 = self.inner.random();
        let fc = if b > a { (c - a) / (b - a) } else { 0.0 };
        if u < fc {
            a + (u * (b - a) * (c - a)).sqrt()
        } else {
            b - ((1.0 - u) * (b - a) * (b - c)).sqrt()
        }
    }

    /// Draws from a normal distribution with mean `mu` and standard
    /// deviation `sigma`. `sigma <= 0.0` returns `mu` deterministically
    /// rather than constructing an invalid distribution.
    pub fn normal(&mut self, mu: f64, sigma: f64) -> f64 {
        if sigma <= 0.0 {
            return mu;
        }
        let dist = Normal::new(mu, sigma).expect("sigma is finite and positive");
        dist.sample(&mut self.inner)
    }

    /// Draws a uniform float in `[low, high)`. Returns `low` if `high <=
    /// low`.
    pub fn uniform_f64(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        let dist = Uniform::new(low, high).expect("low < high");
        dist.sample(&mut self.inner)
    }

    /// Draws a uniform integer in `[low, high]` inclusive. Returns `low` if
    /// `high <= low`.
    pub fn uniform_u64(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        let dist = Uniform::new_inclusive(low, high).expect("low <= high");
        dist.sample(&mut self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_produces_same_sequence() {
        let mut a = SimRng::new(42);
        let mut b = SimRng::new(42);
        for _ in 0..10 {
            assert_eq!(a.exponential(5.0), b.exponential(5.0));
            assert_eq!(a.normal(1.0, 0.1), b.normal(1.0, 0.1));
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = SimRng::new(1);
        let mut b = SimRng::new(2);
        let seq_a: Vec<f64> = (0..20).map(|_| a.normal(0.0, 1.0)).collect();
        let seq_b: Vec<f64> = (0..20).map(|_| b.normal(0.0, 1.0)).collect();
        assert_ne!(seq_a, seq_b);
    }

    #[test]
    fn triangular_degenerate_returns_point() {
        let mut rng = SimRng::new(7);
        for _ in 0..5 {
            assert_eq!(rng.triangular(21.0, 21.0, 21.0), 21.0);
        }
    }

    #[test]
    fn triangular_respects_bounds() {
        let mut rng = SimRng::new(7);
        for _ in 0..1000 {
            let x = rng.triangular(3.0, 7.0, 21.0);
            assert!((3.0..=21.0).contains(&x), "{x} out of bounds");
        }
    }

    #[test]
    fn triangular_branches_meet_at_the_mode() {
        // At u == fc both inverse-CDF branches must evaluate to the mode.
        let (a, c, b) = (3.0_f64, 7.0, 21.0);
        let fc = (c - a) / (b - a);
        let lower = a + (fc * (b - a) * (c - a)).sqrt();
        let upper = b - ((1.0 - fc) * (b - a) * (b - c)).sqrt();
        assert!((lower - c).abs() < 1e-9, "lower branch at u=fc was {lower}, expected {c}");
        assert!((upper - c).abs() < 1e-9, "upper branch at u=fc was {upper}, expected {c}");
    }

    #[test]
    fn normal_zero_sigma_is_deterministic() {
        let mut rng = SimRng::new(7);
        for _ in 0..5 {
            assert_eq!(rng.normal(2.5, 0.0), 2.5);
        }
    }

    #[test]
    fn exponential_nonnegative() {
        let mut rng = SimRng::new(7);
        for _ in 0..1000 {
            assert!(rng.exponential(3.0) >= 0.0);
        }
    }

    #[test]
    fn uniform_u64_degenerate_bounds() {
        let mut rng = SimRng::new(1);
        assert_eq!(rng.uniform_u64(5, 5), 5);
        assert_eq!(rng.uniform_u64(9, 3), 9);
    }
}
