use crate::{bindings::MediaType, utils::time_ranges::TimeRanges, Logger};

/// Margin, in seconds, under which a segment is still considered fully buffered when the
/// sink reports slightly less than its announced time range.
const BUFFERED_TOLERANCE: f64 = 0.2;

/// Information on a single chunk, present in the buffer at least partially.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct BufferedChunk {
    /// Track the segment belongs to.
    track_id: u32,

    /// Start, in seconds, the chunk is supposed to have according to the manifest.
    /// Can be moved forward when a later segment overlaps it.
    start: f64,

    /// End, in seconds, the chunk is supposed to have according to the manifest.
    end: f64,

    /// Last seen media start of the segment in the buffer, in seconds.
    /// It can be different than `start` due to buffer garbage collection.
    last_buffered_start: f64,

    /// Last seen media end of the segment in the buffer, in seconds.
    last_buffered_end: f64,
}

#[cfg(test)]
impl BufferedChunk {
    pub(crate) fn track_id(&self) -> u32 {
        self.track_id
    }

    pub(crate) fn start(&self) -> f64 {
        self.start
    }

    pub(crate) fn end(&self) -> f64 {
        self.end
    }

    pub(crate) fn last_buffered_start(&self) -> f64 {
        self.last_buffered_start
    }
}

/// Keeps track of which segments are in a media sink, in chronological order.
///
/// The sink only reports time ranges. This inventory links them back to segments, so the
/// rest of the core knows which segments do not need to be loaded again and which ones
/// were garbage collected.
pub(crate) struct SegmentInventory {
    media_type: MediaType,
    inventory: Vec<BufferedChunk>,
}

impl SegmentInventory {
    pub(super) fn new(media_type: MediaType) -> Self {
        Self {
            media_type,
            inventory: vec![],
        }
    }

    pub(super) fn reset(&mut self) {
        self.inventory.clear();
    }

    #[cfg(test)]
    pub(super) fn inventory(&self) -> &[BufferedChunk] {
        &self.inventory
    }

    /// Add a segment which has just been pushed to the sink.
    ///
    /// Previously-inserted chunks overlapping it are replaced on that overlap, as the sink
    /// does for the media data itself.
    pub(super) fn insert_segment(&mut self, track_id: u32, start: f64, end: f64) {
        let mut updated = Vec::with_capacity(self.inventory.len() + 2);
        for chunk in self.inventory.drain(..) {
            if chunk.end <= start || chunk.start >= end {
                updated.push(chunk);
                continue;
            }
            if chunk.start < start {
                updated.push(BufferedChunk {
                    end: start,
                    last_buffered_end: chunk.last_buffered_end.min(start),
                    ..chunk.clone()
                });
            }
            if chunk.end > end {
                updated.push(BufferedChunk {
                    start: end,
                    last_buffered_start: chunk.last_buffered_start.max(end),
                    ..chunk
                });
            } else {
                Logger::debug(&format!(
                    "SI: {} segment [{}, {}) of track {} replaced",
                    self.media_type, chunk.start, chunk.end, chunk.track_id
                ));
            }
        }
        let pos = updated.partition_point(|c| c.start < start);
        updated.insert(
            pos,
            BufferedChunk {
                track_id,
                start,
                end,
                last_buffered_start: start,
                last_buffered_end: end,
            },
        );
        self.inventory = updated;
    }

    /// Update the inventory based on what the sink reports as buffered.
    ///
    /// Chunks which are not buffered anymore at all are removed, the other have their
    /// `last_buffered_*` bounds updated.
    pub(super) fn synchronize(&mut self, buffered: &TimeRanges) {
        let media_type = self.media_type;
        self.inventory.retain_mut(|chunk| {
            match buffered.intersection_hull(chunk.start, chunk.end) {
                None => {
                    Logger::debug(&format!(
                        "SI: {media_type} segment [{}, {}) garbage collected",
                        chunk.start, chunk.end
                    ));
                    false
                }
                Some((start, end)) => {
                    chunk.last_buffered_start = start;
                    chunk.last_buffered_end = end;
                    true
                }
            }
        });
    }

    /// Returns `true` if `[start, end)` is covered by chunks still in the buffer.
    ///
    /// Contiguous chunks of any track are considered together.
    pub(super) fn is_buffered(&self, start: f64, end: f64) -> bool {
        let tolerance = BUFFERED_TOLERANCE.min((end - start) / 4.);
        let wanted_start = start + tolerance;
        let wanted_end = end - tolerance;
        let mut covered_until: Option<f64> = None;
        for chunk in &self.inventory {
            if chunk.last_buffered_end <= wanted_start {
                continue;
            }
            match covered_until {
                None => {
                    if chunk.last_buffered_start > wanted_start {
                        return false;
                    }
                }
                Some(until) => {
                    if chunk.last_buffered_start > until + BUFFERED_TOLERANCE {
                        return false;
                    }
                }
            }
            covered_until = Some(chunk.last_buffered_end);
            if chunk.last_buffered_end >= wanted_end {
                return true;
            }
        }
        false
    }

    /// Smallest span of whole chunks enclosing the given interval.
    pub(super) fn enclosing_span(&self, start: f64, end: f64) -> Option<(f64, f64)> {
        self.inventory
            .iter()
            .filter(|c| c.start < end + BUFFERED_TOLERANCE && c.end > start - BUFFERED_TOLERANCE)
            .fold(None, |acc, c| match acc {
                None => Some((c.start, c.end)),
                Some((s, e)) => Some((f64::min(s, c.start), f64::max(e, c.end))),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_overlaps() {
        let mut si = SegmentInventory::new(MediaType::Video);
        si.insert_segment(1, 0., 4.);
        si.insert_segment(1, 4., 8.);
        si.insert_segment(2, 2., 6.);
        let bounds: Vec<(u32, f64, f64)> = si
            .inventory()
            .iter()
            .map(|c| (c.track_id(), c.start(), c.end()))
            .collect();
        assert_eq!(bounds, vec![(1, 0., 2.), (2, 2., 6.), (1, 6., 8.)]);

        si.insert_segment(3, 0., 8.);
        assert_eq!(si.inventory().len(), 1);
    }

    #[test]
    fn test_synchronize_detects_garbage_collection() {
        let mut si = SegmentInventory::new(MediaType::Audio);
        for i in 0..4 {
            si.insert_segment(1, f64::from(i) * 2., f64::from(i + 1) * 2.);
        }
        si.synchronize(&TimeRanges::from_ranges([(3., 8.)]));
        assert_eq!(si.inventory().len(), 3);
        assert_eq!(si.inventory()[0].last_buffered_start(), 3.);
        assert!(!si.is_buffered(2., 4.));
        assert!(si.is_buffered(3., 4.));
        assert!(si.is_buffered(4., 8.));
        assert!(!si.is_buffered(6., 10.));
    }

    #[test]
    fn test_is_buffered_tolerates_small_differences() {
        let mut si = SegmentInventory::new(MediaType::Video);
        si.insert_segment(1, 0., 2.);
        si.insert_segment(1, 2., 4.);
        si.synchronize(&TimeRanges::from_ranges([(0.04, 3.96)]));
        assert!(si.is_buffered(0., 4.));
        assert!(si.is_buffered(2., 4.));
    }

    #[test]
    fn test_enclosing_span() {
        let mut si = SegmentInventory::new(MediaType::Video);
        for i in 0..5 {
            si.insert_segment(1, f64::from(i) * 2., f64::from(i + 1) * 2.);
        }
        assert_eq!(si.enclosing_span(5.9, 6.), Some((4., 8.)));
        assert_eq!(si.enclosing_span(2.5, 2.7), Some((2., 4.)));
        assert_eq!(si.enclosing_span(20., 21.), None);
    }
}
