use super::ewma::Ewma;

const FAST_EWMA_HALF_LIFE: f64 = 2.;
const SLOW_EWMA_HALF_LIFE: f64 = 10.;
const MINIMUM_CHUNK_SIZE: u64 = 16_000;
const MINIMUM_TOTAL_BYTES: u64 = 150_000;

/// Produce bandwidth estimates based on two EWMA (exponentially-weighted moving average), one
/// evolving slow and the other evolving fast.
///
/// The minimum between both is then taken into consideration to ensure a sudden fall in bandwidth
/// has a lasting impact on estimates and that we only raise that estimate once it raised for
/// enough time.
#[derive(Clone, Debug)]
pub(crate) struct BandwidthEstimator {
    fast_ewma: Ewma,
    slow_ewma: Ewma,
    bytes_sampled: u64,
    /// Estimate returned until enough data has been sampled, in bits per second.
    initial_estimate: f64,
}

impl BandwidthEstimator {
    pub(crate) fn new(initial_estimate: f64) -> Self {
        Self {
            fast_ewma: Ewma::new(FAST_EWMA_HALF_LIFE),
            slow_ewma: Ewma::new(SLOW_EWMA_HALF_LIFE),
            bytes_sampled: 0,
            initial_estimate,
        }
    }

    /// Feed the `BandwidthEstimator` a new sample: `size_bytes` loaded in `elapsed_seconds`.
    ///
    /// Samples without a positive duration are ignored, as are chunks too small for their
    /// duration to mean anything else than latency.
    pub(crate) fn sample(&mut self, size_bytes: u64, elapsed_seconds: f64) {
        if !elapsed_seconds.is_finite() || elapsed_seconds <= 0. {
            return;
        }
        if size_bytes < MINIMUM_CHUNK_SIZE {
            return;
        }
        let bandwidth = (size_bytes as f64) * 8. / elapsed_seconds;
        self.bytes_sampled += size_bytes;
        self.fast_ewma.add_sample(elapsed_seconds, bandwidth);
        self.slow_ewma.add_sample(elapsed_seconds, bandwidth);
    }

    /// Get the current estimate, in bits per second.
    ///
    /// Returns the initial estimate while not enough data has been sampled.
    pub(crate) fn estimate(&self) -> f64 {
        if self.bytes_sampled < MINIMUM_TOTAL_BYTES {
            self.initial_estimate
        } else {
            self.fast_ewma
                .get_estimate()
                .min(self.slow_ewma.get_estimate())
        }
    }

    /// Reset the `BandwidthEstimator` as if there was no sample added yet.
    pub(crate) fn reset(&mut self) {
        self.fast_ewma = Ewma::new(FAST_EWMA_HALF_LIFE);
        self.slow_ewma = Ewma::new(SLOW_EWMA_HALF_LIFE);
        self.bytes_sampled = 0;
    }
}
