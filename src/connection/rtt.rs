//! Round-trip time estimation from client acks (§4.5).

use crate::stream_config::{new_rtt_window, SampleRing};
use parking_lot::Mutex;
use std::time::Duration;

pub struct RttEstimator {
    window: Mutex<SampleRing>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self { window: Mutex::new(new_rtt_window()) }
    }

    pub fn record_sample(&self, rtt: Duration) {
        self.window.lock().push(rtt.as_secs_f64() * 1000.0);
    }

    /// Mean of up to the last 30 samples, milliseconds. Zero if no
    /// samples have been recorded yet.
    pub fn estimated_rtt_ms(&self) -> f64 {
        self.window.lock().mean()
    }
}

impl Default for RttEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_samples_is_estimated_rtt() {
        let est = RttEstimator::new();
        est.record_sample(Duration::from_millis(20));
        est.record_sample(Duration::from_millis(40));
        assert_eq!(est.estimated_rtt_ms(), 30.0);
    }

    #[test]
    fn no_samples_means_zero() {
        let est = RttEstimator::new();
        assert_eq!(est.estimated_rtt_ms(), 0.0);
    }
}
