use std::collections::VecDeque;

#[cfg(test)]
use unimock::unimock;

use crate::{ThroughputSample, ThroughputSampleSource};

/// Trait for throughput estimation strategies.
///
/// Allows testing `AbrEngine` with mock estimators.
#[cfg_attr(test, unimock(api = EstimatorMock))]
pub trait Estimator {
    /// Get estimated throughput in bits per second.
    fn estimate_bps(&self) -> Option<u64>;

    /// Push a new throughput sample for estimation.
    fn push_sample(&mut self, sample: ThroughputSample);

    /// Forget all samples.
    fn reset(&mut self);
}

/// Dual-EWMA estimator: the minimum of a fast and a slow moving average.
#[derive(Clone, Debug)]
pub struct ThroughputEstimator {
    fast_ewma: Ewma,
    slow_ewma: Ewma,
}

impl ThroughputEstimator {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;
    const MIN_CHUNK_BYTES: u64 = 16_000;
    const MIN_DURATION_MS: f64 = 0.5;

    pub fn new() -> Self {
        Self {
            fast_ewma: Ewma::new(Self::FAST_HALF_LIFE_SECS),
            slow_ewma: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
        }
    }
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator for ThroughputEstimator {
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // est > 0
    fn estimate_bps(&self) -> Option<u64> {
        let est = self
            .fast_ewma
            .get_estimate()
            .min(self.slow_ewma.get_estimate());

        (est > 0.0).then(|| est.round() as u64)
    }

    fn push_sample(&mut self, sample: ThroughputSample) {
        if !matches!(sample.source, ThroughputSampleSource::Network) {
            return;
        }
        if sample.bytes < Self::MIN_CHUNK_BYTES {
            return;
        }

        let dur_ms = (sample.duration.as_secs_f64() * 1000.0).max(Self::MIN_DURATION_MS);
        #[expect(clippy::cast_precision_loss)]
        let bps = (sample.bytes as f64) * 8000.0 / dur_ms;
        let weight_secs = dur_ms / 1000.0;

        self.fast_ewma.add_sample(weight_secs, bps);
        self.slow_ewma.add_sample(weight_secs, bps);
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Sliding-window estimator: total bits over total download time of the
/// last `window` network samples.
#[derive(Clone, Debug)]
pub struct WindowEstimator {
    window: usize,
    samples: VecDeque<(u64, f64)>,
}

impl WindowEstimator {
    pub const DEFAULT_WINDOW: usize = 5;

    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for WindowEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

impl Estimator for WindowEstimator {
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn estimate_bps(&self) -> Option<u64> {
        let secs: f64 = self.samples.iter().map(|&(_, s)| s).sum();
        if self.samples.is_empty() || secs <= 0.0 {
            return None;
        }
        let bits: f64 = self.samples.iter().map(|&(b, _)| b as f64 * 8.0).sum();
        Some((bits / secs).round() as u64)
    }

    fn push_sample(&mut self, sample: ThroughputSample) {
        if !matches!(sample.source, ThroughputSampleSource::Network) {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples
            .push_back((sample.bytes, sample.duration.as_secs_f64()));
    }

    fn reset(&mut self) {
        self.samples.clear();
    }
}

#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    last_estimate: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life_secs.max(0.001)),
            last_estimate: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, val: f64) {
        let adj_alpha = self.alpha.powf(weight.max(0.0));
        let new_estimate = val * (1.0 - adj_alpha) + adj_alpha * self.last_estimate;
        self.last_estimate = new_estimate;
        self.total_weight += weight.max(0.0);
    }

    fn get_estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            0.0
        } else {
            let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
            self.last_estimate / zero_factor.max(1e-6)
        }
    }
}
