use crate::content_tracker::Track;

use self::bandwidth_estimator::BandwidthEstimator;

mod bandwidth_estimator;
mod ewma;

/// Chooses the track to play based on network metrics.
pub(crate) struct AdaptationEngine {
    bandwidth_estimator: BandwidthEstimator,

    /// Only this fraction of the bandwidth estimate is considered usable, leaving room for
    /// estimation errors.
    safety_factor: f64,

    /// When `false`, `choose_track` is never consulted for automatic switches.
    enabled: bool,
}

impl AdaptationEngine {
    pub(crate) fn new(initial_bandwidth: f64, safety_factor: f64) -> Self {
        Self {
            bandwidth_estimator: BandwidthEstimator::new(initial_bandwidth),
            safety_factor,
            enabled: true,
        }
    }

    /// Adds metric allowing the `AdaptationEngine` to provide more educated guesses.
    /// Here, `duration_ms` should correspond to the time taken to make a request and
    /// `size_bytes` should be the corresponding size of loaded data.
    pub(crate) fn add_metric(&mut self, duration_ms: f64, size_bytes: u64) {
        self.bandwidth_estimator
            .sample(size_bytes, duration_ms / 1000.);
    }

    /// Current raw bandwidth estimate, in bits per second.
    pub(crate) fn bandwidth_estimate(&self) -> f64 {
        self.bandwidth_estimator.estimate()
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns the id of the track that should be played among the given eligible
    /// `tracks`: the highest bitrate fitting in the usable bandwidth, or the lowest one
    /// if none fit.
    ///
    /// When two candidates have the same bitrate, `current` is preferred.
    pub(crate) fn choose_track(&self, tracks: &[Track], current: Option<u32>) -> Option<u32> {
        let budget = self.bandwidth_estimate() * self.safety_factor;
        let prefer = |best: Option<&Track>, track: &Track, is_better: bool| -> bool {
            match best {
                None => true,
                Some(best) => {
                    is_better || (track.bandwidth == best.bandwidth && Some(track.id) == current)
                }
            }
        };

        let mut best_fitting: Option<&Track> = None;
        let mut lowest: Option<&Track> = None;
        for track in tracks {
            if track.bandwidth <= budget {
                let is_better = best_fitting.map_or(true, |b| track.bandwidth > b.bandwidth);
                if prefer(best_fitting, track, is_better) {
                    best_fitting = Some(track);
                }
            }
            let is_lower = lowest.map_or(true, |l| track.bandwidth < l.bandwidth);
            if prefer(lowest, track, is_lower) {
                lowest = Some(track);
            }
        }
        best_fitting.or(lowest).map(|t| t.id)
    }

    pub(crate) fn reset(&mut self) {
        self.bandwidth_estimator.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::MediaType;

    fn track(id: u32, bandwidth: f64) -> Track {
        Track {
            id,
            content_type: MediaType::Video,
            bandwidth,
            width: None,
            height: None,
            language: None,
            active: false,
            enabled: false,
        }
    }

    #[test]
    fn test_choose_highest_fitting_track() {
        let engine = AdaptationEngine::new(2_000_000., 0.8);
        let tracks = [
            track(1, 500_000.),
            track(2, 1_500_000.),
            track(3, 1_700_000.),
        ];
        // 2Mbps * 0.8 = 1.6Mbps usable
        assert_eq!(engine.choose_track(&tracks, None), Some(2));
    }

    #[test]
    fn test_choose_lowest_when_nothing_fits() {
        let engine = AdaptationEngine::new(100_000., 0.8);
        let tracks = [track(4, 900_000.), track(5, 300_000.), track(6, 2_000_000.)];
        assert_eq!(engine.choose_track(&tracks, Some(6)), Some(5));
        assert_eq!(engine.choose_track(&[], None), None);
    }

    #[test]
    fn test_ties_prefer_current_track() {
        let engine = AdaptationEngine::new(10_000_000., 0.8);
        let tracks = [track(1, 1_000_000.), track(2, 1_000_000.)];
        assert_eq!(engine.choose_track(&tracks, Some(2)), Some(2));
        assert_eq!(engine.choose_track(&tracks, Some(1)), Some(1));
        assert_eq!(engine.choose_track(&tracks, None), Some(1));
    }

    #[test]
    fn test_metrics_change_choice() {
        let mut engine = AdaptationEngine::new(10_000_000., 0.8);
        let tracks = [track(1, 400_000.), track(2, 3_000_000.)];
        assert_eq!(engine.choose_track(&tracks, None), Some(2));
        // 1Mbps measured
        for _ in 0..4 {
            engine.add_metric(1000., 125_000);
        }
        assert_eq!(engine.choose_track(&tracks, Some(2)), Some(1));
        engine.reset();
        assert_eq!(engine.choose_track(&tracks, Some(1)), Some(2));
    }
}
