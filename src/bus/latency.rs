//! Per-(publisher, subscriber) latency injection.
//!
//! Every publish is delayed before the subscriber sees it. The delay is
//! sampled fresh each time from a `LatencyParameters`, never cached, so two
//! publishes between the same pair of agents can land at different offsets -
//! this mirrors a real network link more closely than a fixed delay would.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::clock::Nanos;

/// A latency distribution to sample a one-way delay from, in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LatencyParameters {
    /// Constant delay, useful for deterministic scenario tests.
    Fixed { nanos: Nanos },
    /// Delay drawn from a lognormal distribution, parameterized by the mean
    /// and standard deviation of the underlying normal in log-space. This is
    /// the shape real network/processing latency tends to take: mostly
    /// tight around a typical value with an occasional long tail, and never
    /// negative.
    Lognormal { mu: f64, sigma: f64 },
}

impl LatencyParameters {
    pub fn fixed(nanos: Nanos) -> Self {
        LatencyParameters::Fixed { nanos }
    }

    pub fn lognormal(mu: f64, sigma: f64) -> Self {
        LatencyParameters::Lognormal { mu, sigma }
    }
}

/// Seeded sampler. One instance is shared by the whole bus so that a fixed
/// seed reproduces an entire run bit-for-bit, including the order in which
/// individual latency draws are consumed.
pub struct LatencySampler {
    rng: ChaCha8Rng,
}

impl LatencySampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw a non-negative delay in nanoseconds from `params`.
    pub fn sample(&mut self, params: &LatencyParameters) -> Nanos {
        match params {
            LatencyParameters::Fixed { nanos } => *nanos,
            LatencyParameters::Lognormal { mu, sigma } => {
                let z = self.sample_standard_normal();
                let draw = (mu + sigma * z).exp();
                draw.max(0.0).round() as Nanos
            }
        }
    }

    /// Box-Muller transform producing one standard-normal sample per two
    /// uniform draws.
    fn sample_standard_normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}
