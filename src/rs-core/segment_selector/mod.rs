use crate::manifest::{InitKey, InitSegmentReference, Timeline, TimelineSegment};

/// Decides which segment of a track should be loaded next.
///
/// It keeps no history of what has been returned before: everything is deduced from the
/// current position and from what the buffer reports, so a seek, a switch or an eviction
/// never leaves it in a stale state.
pub(crate) struct NextSegmentSelector {
    /// Amount of buffer, ahead of the current position we want to build in seconds.
    /// Once we reached that point, we won't try to load load new segments.
    ///
    /// This can for example be used to limit memory and network bandwidth usage.
    buffer_goal: f64,

    /// Position from which the buffer goal is computed.
    base_pos: f64,

    /// `true` when segments have to be loaded behind the position (negative playback rate).
    reverse: bool,

    /// Content seconds consumed per second of playback, never under `1`.
    speed: f64,
}

impl NextSegmentSelector {
    pub(crate) fn new(base_pos: f64, buffer_goal: f64) -> Self {
        Self {
            buffer_goal,
            base_pos,
            reverse: false,
            speed: 1.,
        }
    }

    pub(crate) fn update_buffer_goal(&mut self, buffer_goal: f64) {
        self.buffer_goal = buffer_goal;
    }

    pub(crate) fn update_base_position(&mut self, base_pos: f64) {
        self.base_pos = base_pos;
    }

    /// Update the direction in which segments are loaded from the current playback rate, and
    /// how far ahead they are. A `0` rate keeps the previous values.
    pub(crate) fn update_playback_rate(&mut self, playback_rate: f64) {
        if playback_rate != 0. {
            self.reverse = playback_rate < 0.;
            self.speed = playback_rate.abs().max(1.);
        }
    }

    /// Content duration, in seconds, loaded from the base position.
    ///
    /// The buffer goal is expressed in playback time, so it grows with the playback speed.
    fn lookahead(&self) -> f64 {
        self.buffer_goal * self.speed
    }

    pub(crate) fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Returns the next segment to load in `timeline`.
    ///
    /// # Arguments
    ///
    /// * `track_id` - Id of the track `timeline` is from.
    ///
    /// * `last_init` - Track id and key of the initialization segment last pushed to the
    ///   buffer, if one.
    ///
    /// * `is_buffered` - Returns `true` if the given `start` and `end` times are already
    ///   buffered.
    pub(crate) fn get_next_segment_info<'a>(
        &self,
        timeline: &'a Timeline,
        track_id: u32,
        last_init: Option<(u32, InitKey)>,
        is_buffered: impl Fn(f64, f64) -> bool,
    ) -> NextSegmentInfo<'a> {
        let pos = self.base_pos;
        let missing = if self.reverse {
            let limit = pos - self.lookahead();
            let mut candidates = timeline
                .segments
                .iter()
                .rev()
                .skip_while(|s| s.reference.start >= pos)
                .take_while(|s| s.reference.end > limit)
                .peekable();
            if candidates.peek().is_none() {
                return NextSegmentInfo::None;
            }
            candidates.find(|s| !is_buffered(s.reference.start, s.reference.end.min(pos)))
        } else {
            let maximum_position = pos + self.lookahead();
            let mut reached_goal = false;
            let found = timeline
                .segments
                .iter()
                .skip_while(|s| s.reference.end <= pos)
                .take_while(|s| {
                    reached_goal = s.reference.start > maximum_position;
                    !reached_goal
                })
                .find(|s| !is_buffered(s.reference.start.max(pos), s.reference.end));
            if found.is_none() && !reached_goal {
                return NextSegmentInfo::EndOfContent;
            }
            found
        };
        let Some(segment) = missing else {
            return NextSegmentInfo::None;
        };
        if let Some(key) = segment.init {
            if last_init != Some((track_id, key)) {
                if let Some(init) = timeline.inits.get(key) {
                    return NextSegmentInfo::InitSegment(key, init);
                }
            }
        }
        NextSegmentInfo::MediaSegment(segment)
    }
}

#[derive(Debug)]
pub(crate) enum NextSegmentInfo<'a> {
    /// Nothing has to be loaded for now.
    None,
    /// That initialization segment has to be pushed before the next media segment.
    InitSegment(InitKey, &'a InitSegmentReference),
    MediaSegment(&'a TimelineSegment),
    /// Every segment from the current position until the end of the content is buffered.
    EndOfContent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bindings::MediaType,
        manifest::tests::{make_manifest, make_set, make_stream},
    };

    fn timeline() -> Timeline {
        let manifest = make_manifest(vec![make_set(
            MediaType::Video,
            vec![make_stream(1, 1_000_000., Some(720), 10, 4.)],
        )]);
        manifest.timeline(MediaType::Video, 1)
    }

    fn start_of(info: NextSegmentInfo<'_>) -> Option<f64> {
        match info {
            NextSegmentInfo::MediaSegment(s) => Some(s.reference.start),
            _ => None,
        }
    }

    #[test]
    fn test_init_segment_first() {
        let timeline = timeline();
        let selector = NextSegmentSelector::new(0., 10.);
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, None, |_, _| false),
            NextSegmentInfo::InitSegment(0, _)
        ));
        // init of another track
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((2, 0)), |_, _| false),
            NextSegmentInfo::InitSegment(0, _)
        ));
        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), |_, _| false);
        assert_eq!(start_of(next), Some(0.));
    }

    #[test]
    fn test_skips_buffered_segments_until_goal() {
        let timeline = timeline();
        let mut selector = NextSegmentSelector::new(5., 10.);
        let buffered = |start: f64, end: f64| start >= 4. && end <= 12.;
        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered);
        assert_eq!(start_of(next), Some(12.));

        let buffered = |start: f64, end: f64| start >= 4. && end <= 16.;
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered),
            NextSegmentInfo::None
        ));

        selector.update_base_position(30.);
        let buffered = |start: f64, _: f64| start >= 30.;
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered),
            NextSegmentInfo::EndOfContent
        ));
        selector.update_base_position(45.);
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), |_, _| false),
            NextSegmentInfo::EndOfContent
        ));
    }

    #[test]
    fn test_lookahead_grows_with_speed() {
        let timeline = timeline();
        let mut selector = NextSegmentSelector::new(0., 6.);
        let buffered = |_: f64, end: f64| end <= 8.;
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered),
            NextSegmentInfo::None
        ));

        selector.update_playback_rate(4.);
        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered);
        assert_eq!(start_of(next), Some(8.));
        let buffered = |_: f64, end: f64| end <= 28.;
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered),
            NextSegmentInfo::None
        ));

        // slower than normal does not shrink it
        selector.update_playback_rate(0.5);
        let buffered = |_: f64, end: f64| end <= 4.;
        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered);
        assert_eq!(start_of(next), Some(4.));

        selector.update_base_position(40.);
        selector.update_playback_rate(-4.);
        let buffered = |start: f64, _: f64| start >= 24.;
        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered);
        assert_eq!(start_of(next), Some(20.));
        let buffered = |start: f64, _: f64| start >= 16.;
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered),
            NextSegmentInfo::None
        ));
    }

    #[test]
    fn test_reverse_playback_loads_behind() {
        let timeline = timeline();
        let mut selector = NextSegmentSelector::new(21., 10.);
        selector.update_playback_rate(-1.);
        assert!(selector.is_reverse());
        selector.update_playback_rate(0.);
        assert!(selector.is_reverse());

        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), |_, _| false);
        assert_eq!(start_of(next), Some(20.));
        let buffered = |start: f64, _: f64| start >= 16.;
        let next = selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered);
        assert_eq!(start_of(next), Some(12.));
        let buffered = |start: f64, _: f64| start >= 8.;
        assert!(matches!(
            selector.get_next_segment_info(&timeline, 1, Some((1, 0)), buffered),
            NextSegmentInfo::None
        ));
    }
}
