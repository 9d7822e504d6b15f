use std::collections::VecDeque;

use super::segment_inventory::SegmentInventory;
use crate::{
    bindings::{MediaType, SinkId},
    errors::BufferError,
    manifest::InitKey,
    platform::MediaSink,
    utils::time_ranges::TimeRanges,
    Logger,
};

/// Removals never touch the `[anchor - ANCHOR_MARGIN, anchor + ANCHOR_MARGIN]` interval, the
/// anchor generally being the playhead.
const ANCHOR_MARGIN: f64 = 1.;

/// What the `BufferManager` knows about the sink's buffered ranges.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BufferedState {
    /// Deduced from local operations since the last sink query. The sink may have evicted
    /// part of it on its own.
    Believed(TimeRanges),
    /// As reported by the sink on the last query, with no local operation since.
    Confirmed(TimeRanges),
}

impl BufferedState {
    pub(crate) fn ranges(&self) -> &TimeRanges {
        match self {
            BufferedState::Believed(r) | BufferedState::Confirmed(r) => r,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_confirmed(&self) -> bool {
        matches!(self, BufferedState::Confirmed(_))
    }

    fn into_believed(self) -> TimeRanges {
        match self {
            BufferedState::Believed(r) | BufferedState::Confirmed(r) => r,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct BufferConfig {
    /// Buffered duration, in seconds, above which old data is evicted.
    pub(crate) max_buffer_duration: f64,
    /// Duration, in seconds, kept behind the playhead when evicting.
    pub(crate) buffer_behind: f64,
    /// Gaps smaller than this, in seconds, are expected to close by themselves.
    pub(crate) closable_gap_threshold: f64,
    /// Completed appends after which a gap which did not close is repaired.
    pub(crate) gap_repair_attempts: u32,
}

/// Time information on a pushed media segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct MediaSegmentMetadata {
    pub(crate) track_id: u32,
    pub(crate) start: f64,
    pub(crate) end: f64,
}

/// An operation scheduled on the sink, not yet reported as finished.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BufferOperation {
    PushInit {
        op_id: u32,
        init: InitKey,
        track_id: u32,
    },
    PushMedia {
        op_id: u32,
        metadata: MediaSegmentMetadata,
    },
    Remove {
        op_id: u32,
        start: f64,
        end: f64,
    },
}

impl BufferOperation {
    pub(crate) fn op_id(&self) -> u32 {
        match self {
            BufferOperation::PushInit { op_id, .. }
            | BufferOperation::PushMedia { op_id, .. }
            | BufferOperation::Remove { op_id, .. } => *op_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum EvictTarget {
    /// Remove everything before that time, in seconds.
    Before(f64),
    /// Remove everything after that time, in seconds.
    After(f64),
}

/// A small hole in the sink's buffered ranges, which should not be there.
#[derive(Clone, Copy, Debug, PartialEq)]
struct GapWatch {
    start: f64,
    end: f64,
    /// Completed appends seen while this gap stayed open.
    attempts: u32,
}

/// Single writer to a media sink: every append and removal on it goes through here.
///
/// Sink operations are asynchronous. They are queued in `queue` until the host reports
/// their end, always in the order in which they were scheduled.
pub(crate) struct BufferManager {
    media_type: MediaType,

    sink: Box<dyn MediaSink>,

    config: BufferConfig,

    queue: VecDeque<BufferOperation>,

    next_op_id: u32,

    /// Media pushes with an `op_id` lower than this were scheduled before a flush.
    /// Their completion is not accounted for.
    ignored_before: u32,

    state: BufferedState,

    /// What should be in the sink if it did not evict anything: every completed media
    /// push, minus our own removals.
    expected: TimeRanges,

    inventory: SegmentInventory,

    /// Track id and key of the last pushed initialization segment.
    last_init: Option<(u32, InitKey)>,

    gap_watches: Vec<GapWatch>,

    /// Media pushes which completed since the last `reconcile` call.
    appends_since_reconcile: u32,
}

impl BufferManager {
    pub(crate) fn new(media_type: MediaType, sink: Box<dyn MediaSink>, config: BufferConfig) -> Self {
        Self {
            media_type,
            sink,
            config,
            queue: VecDeque::new(),
            next_op_id: 0,
            ignored_before: 0,
            state: BufferedState::Confirmed(TimeRanges::new()),
            expected: TimeRanges::new(),
            inventory: SegmentInventory::new(media_type),
            last_init: None,
            gap_watches: vec![],
            appends_since_reconcile: 0,
        }
    }

    pub(crate) fn sink_id(&self) -> SinkId {
        self.sink.id()
    }

    pub(crate) fn has_pending_operations(&self) -> bool {
        !self.queue.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> &BufferedState {
        &self.state
    }

    /// Last known buffered ranges, confirmed or not.
    pub(crate) fn ranges(&self) -> &TimeRanges {
        self.state.ranges()
    }

    /// Returns `true` if the operation with that id was scheduled before the last flush, in
    /// which case its completion is not accounted for.
    pub(crate) fn is_discarded(&self, op_id: u32) -> bool {
        op_id < self.ignored_before
    }

    pub(crate) fn last_pushed_init(&self) -> Option<(u32, InitKey)> {
        self.last_init
    }

    /// Returns `true` if the segment inventory, as of the last reconciliation, indicates that
    /// `[start, end)` is buffered.
    pub(crate) fn is_segment_buffered(&self, start: f64, end: f64) -> bool {
        self.inventory.is_buffered(start, end)
    }

    pub(crate) fn push_init(
        &mut self,
        data: &[u8],
        track_id: u32,
        init: InitKey,
    ) -> Result<u32, BufferError> {
        Logger::debug(&format!(
            "BM: {} pushing init segment of track {track_id}",
            self.media_type
        ));
        self.sink.append(data)?;
        self.last_init = Some((track_id, init));
        Ok(self.enqueue(|op_id| BufferOperation::PushInit {
            op_id,
            init,
            track_id,
        }))
    }

    pub(crate) fn push_media(
        &mut self,
        data: &[u8],
        metadata: MediaSegmentMetadata,
    ) -> Result<u32, BufferError> {
        Logger::lazy_debug(&|| {
            format!(
                "BM: {} pushing segment [{}, {}) of track {}",
                self.media_type, metadata.start, metadata.end, metadata.track_id
            )
        });
        self.sink.append(data)?;
        Ok(self.enqueue(|op_id| BufferOperation::PushMedia { op_id, metadata }))
    }

    /// Schedule the removal of `[start, end)` from the sink.
    pub(crate) fn remove(&mut self, start: f64, end: f64) -> Result<u32, BufferError> {
        Logger::debug(&format!(
            "BM: {} removing [{start}, {end})",
            self.media_type
        ));
        self.sink.remove(start, end)?;
        let mut believed = std::mem::take(&mut self.state).into_believed();
        believed.remove_range(start, end);
        self.inventory.synchronize(&believed);
        self.expected.remove_range(start, end);
        self.gap_watches
            .retain(|g| g.end <= start || g.start >= end);
        self.state = BufferedState::Believed(believed);
        Ok(self.enqueue(|op_id| BufferOperation::Remove { op_id, start, end }))
    }

    /// Remove everything from the sink. Media pushes still pending are not accounted for
    /// once they end.
    pub(crate) fn flush(&mut self) -> Result<u32, BufferError> {
        Logger::info(&format!("BM: {} flushing buffer", self.media_type));
        self.ignored_before = self.next_op_id;
        self.inventory.reset();
        self.gap_watches.clear();
        self.appends_since_reconcile = 0;
        self.remove(0., f64::INFINITY)
    }

    /// Remove data before or after a given time, never touching the area around `anchor`.
    ///
    /// Returns `None` if there was nothing left to remove once clipped.
    pub(crate) fn evict(
        &mut self,
        target: EvictTarget,
        anchor: f64,
    ) -> Result<Option<u32>, BufferError> {
        let (start, end) = match target {
            EvictTarget::Before(time) => (0., time.min(anchor - ANCHOR_MARGIN)),
            EvictTarget::After(time) => (time.max(anchor + ANCHOR_MARGIN), f64::INFINITY),
        };
        let Some((start, end)) = self.ranges().intersection_hull(start, end) else {
            return Ok(None);
        };
        self.remove(start, end).map(Some)
    }

    /// Remove everything after `time`, never touching the area around `anchor`, media pushes
    /// still pending included.
    ///
    /// Returns `None` if there was nothing to remove.
    pub(crate) fn clear_after(
        &mut self,
        time: f64,
        anchor: f64,
    ) -> Result<Option<u32>, BufferError> {
        let start = time.max(anchor + ANCHOR_MARGIN);
        let ignored_before = self.ignored_before;
        let pending_after = self.queue.iter().any(|op| match op {
            BufferOperation::PushMedia { op_id, metadata } => {
                *op_id >= ignored_before && metadata.end > start
            }
            _ => false,
        });
        if pending_after {
            self.remove(start, f64::INFINITY).map(Some)
        } else {
            self.evict(EvictTarget::After(time), anchor)
        }
    }

    /// Query the sink for what it actually buffers and update what we know with it.
    pub(crate) fn reconcile(&mut self) -> &TimeRanges {
        let buffered = self.sink.buffered();
        if let BufferedState::Believed(believed) = &self.state {
            if believed.total_duration() - buffered.total_duration() > ANCHOR_MARGIN {
                Logger::info(&format!(
                    "BM: {} sink evicted data. Believed: {:?}, sink: {:?}",
                    self.media_type,
                    believed.to_vec(),
                    buffered.to_vec()
                ));
            }
        }
        self.inventory.synchronize(&buffered);
        self.update_gap_watches(&buffered);
        self.state = BufferedState::Confirmed(buffered);
        self.state.ranges()
    }

    /// To call when the sink reports the end of its oldest pending operation.
    ///
    /// Returns the operation in question, `None` if none was pending.
    pub(crate) fn on_operation_end(&mut self) -> Option<BufferOperation> {
        let op = self.queue.pop_front()?;
        let media_type = self.media_type;
        match &op {
            BufferOperation::PushMedia { op_id, metadata } if *op_id >= self.ignored_before => {
                let mut believed = std::mem::take(&mut self.state).into_believed();
                believed.add(metadata.start, metadata.end);
                self.state = BufferedState::Believed(believed);
                self.expected.add(metadata.start, metadata.end);
                self.inventory
                    .insert_segment(metadata.track_id, metadata.start, metadata.end);
                self.appends_since_reconcile += 1;
            }
            BufferOperation::PushMedia { .. } => Logger::debug(&format!(
                "BM: {media_type} push {} ended after a flush",
                op.op_id()
            )),
            BufferOperation::PushInit { init, track_id, .. } => Logger::debug(&format!(
                "BM: {media_type} init segment {init} of track {track_id} pushed (op {})",
                op.op_id()
            )),
            BufferOperation::Remove { start, end, .. } => {
                Logger::debug(&format!(
                    "BM: {media_type} removed [{start}, {end}) (op {})",
                    op.op_id()
                ));
                // pushes scheduled before the removal ended before it and are covered too
                let mut believed = std::mem::take(&mut self.state).into_believed();
                believed.remove_range(*start, *end);
                self.inventory.synchronize(&believed);
                self.expected.remove_range(*start, *end);
                self.state = BufferedState::Believed(believed);
            }
        }
        Some(op)
    }

    /// Range which should be removed to go back under the maximum buffer duration, if one.
    ///
    /// Data is removed from the oldest in the playback direction, without coming closer
    /// than `buffer_behind` seconds to the playhead.
    pub(crate) fn eviction_range(&self, position: f64, playback_rate: f64) -> Option<(f64, f64)> {
        let ranges = self.ranges();
        let mut excess = ranges.total_duration() - self.config.max_buffer_duration;
        if excess <= 0. {
            return None;
        }
        if playback_rate >= 0. {
            let limit = position - self.config.buffer_behind;
            let first_start = ranges.start(0)?;
            let mut end = first_start;
            for range in ranges {
                if range.start() >= limit || excess <= 0. {
                    break;
                }
                let removable = range.end().min(limit) - range.start();
                end = range.start() + removable.min(excess);
                excess -= removable;
            }
            (end > first_start).then_some((first_start, end))
        } else {
            let limit = position + self.config.buffer_behind;
            let last_end = ranges.end(ranges.len().checked_sub(1)?)?;
            let mut start = last_end;
            for range in ranges.iter().rev() {
                if range.end() <= limit || excess <= 0. {
                    break;
                }
                let removable = range.end() - range.start().max(limit);
                start = range.end() - removable.min(excess);
                excess -= removable;
            }
            (start < last_end).then_some((start, last_end))
        }
    }

    /// Remove old data if the maximum buffer duration is exceeded.
    /// Should be called on confirmed ranges.
    ///
    /// Returns `true` if a removal has been scheduled.
    pub(crate) fn evict_excess(&mut self, position: f64, playback_rate: f64) -> Result<bool, BufferError> {
        let Some((start, end)) = self.eviction_range(position, playback_rate) else {
            return Ok(false);
        };
        Logger::info(&format!(
            "BM: {} buffer too large, evicting [{start}, {end})",
            self.media_type
        ));
        let target = if playback_rate >= 0. {
            EvictTarget::Before(end)
        } else {
            EvictTarget::After(start)
        };
        Ok(self.evict(target, position)?.is_some())
    }

    /// Span which should be removed then pushed again to close a gap which persisted
    /// through too many appends, if one.
    pub(crate) fn gap_repair_span(&self, position: f64, playback_rate: f64) -> Option<(f64, f64)> {
        self.gap_watches
            .iter()
            .filter(|g| g.attempts >= self.config.gap_repair_attempts)
            .find_map(|g| {
                let (start, end) = self.inventory.enclosing_span(g.start, g.end)?;
                if playback_rate >= 0. {
                    let start = start.max(position + ANCHOR_MARGIN);
                    (g.start >= position + ANCHOR_MARGIN && end > start).then_some((start, end))
                } else {
                    let end = end.min(position - ANCHOR_MARGIN);
                    (g.end <= position - ANCHOR_MARGIN && end > start).then_some((start, end))
                }
            })
    }

    /// Remove the segments around a persistent gap, so they are loaded and pushed again.
    ///
    /// Returns `true` if a removal has been scheduled.
    pub(crate) fn repair_gaps(&mut self, position: f64, playback_rate: f64) -> Result<bool, BufferError> {
        let Some((start, end)) = self.gap_repair_span(position, playback_rate) else {
            return Ok(false);
        };
        Logger::warn(&format!(
            "BM: {} gap did not close after {} appends, removing [{start}, {end})",
            self.media_type, self.config.gap_repair_attempts
        ));
        self.remove(start, end)?;
        Ok(true)
    }

    fn update_gap_watches(&mut self, buffered: &TimeRanges) {
        let appends = std::mem::take(&mut self.appends_since_reconcile);
        let threshold = self.config.closable_gap_threshold;
        let previous = std::mem::take(&mut self.gap_watches);
        self.gap_watches = buffered
            .gaps()
            .into_iter()
            .filter(|(start, end)| end - start < threshold && self.expected.covers(*start, *end))
            .map(|(start, end)| {
                let attempts = previous
                    .iter()
                    .find(|g| g.start < end && g.end > start)
                    .map_or(0, |g| g.attempts + appends);
                if attempts == 0 {
                    Logger::debug(&format!(
                        "BM: {} unexpected gap at [{start}, {end})",
                        self.media_type
                    ));
                }
                GapWatch {
                    start,
                    end,
                    attempts,
                }
            })
            .collect();
    }

    fn enqueue(&mut self, make_op: impl FnOnce(u32) -> BufferOperation) -> u32 {
        let op_id = self.next_op_id;
        self.next_op_id = self.next_op_id.wrapping_add(1);
        self.queue.push_back(make_op(op_id));
        op_id
    }
}

impl Default for BufferedState {
    fn default() -> Self {
        BufferedState::Believed(TimeRanges::new())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::platform::{
        testing::{segment_data, FakeMediaHost, HostState, SinkState},
        MediaHost,
    };

    fn config() -> BufferConfig {
        BufferConfig {
            max_buffer_duration: 20.,
            buffer_behind: 4.,
            closable_gap_threshold: 0.5,
            gap_repair_attempts: 3,
        }
    }

    fn new_manager() -> (BufferManager, Rc<RefCell<SinkState>>) {
        let host_state = Rc::new(RefCell::new(HostState::default()));
        let mut host = FakeMediaHost(Rc::clone(&host_state));
        let sink = host
            .create_sink(MediaType::Video, "video/mp4", "avc1.4d401f")
            .unwrap();
        let sink_state = host_state.borrow().sink(MediaType::Video).unwrap();
        (BufferManager::new(MediaType::Video, sink, config()), sink_state)
    }

    fn push_and_process(bm: &mut BufferManager, sink: &Rc<RefCell<SinkState>>, start: f64, end: f64) {
        let metadata = MediaSegmentMetadata {
            track_id: 1,
            start,
            end,
        };
        bm.push_media(&segment_data(start, end, 100), metadata).unwrap();
        sink.borrow_mut().process_next();
        bm.on_operation_end();
    }

    #[test]
    fn test_believed_then_confirmed() {
        let (mut bm, sink) = new_manager();
        push_and_process(&mut bm, &sink, 0., 4.);
        push_and_process(&mut bm, &sink, 4., 8.);
        assert!(!bm.state().is_confirmed());
        assert_eq!(bm.ranges().to_vec(), vec![(0., 8.)]);

        sink.borrow_mut().garbage_collect(0., 4.);
        assert_eq!(bm.reconcile().to_vec(), vec![(4., 8.)]);
        assert!(bm.state().is_confirmed());
        assert!(!bm.is_segment_buffered(0., 4.));
        assert!(bm.is_segment_buffered(4., 8.));
    }

    #[test]
    fn test_flush_ignores_pending_pushes() {
        let (mut bm, sink) = new_manager();
        let metadata = MediaSegmentMetadata {
            track_id: 1,
            start: 0.,
            end: 4.,
        };
        bm.push_media(&segment_data(0., 4., 100), metadata).unwrap();
        bm.flush().unwrap();
        assert!(bm.has_pending_operations());

        sink.borrow_mut().process_next();
        assert!(matches!(
            bm.on_operation_end(),
            Some(BufferOperation::PushMedia { .. })
        ));
        sink.borrow_mut().process_next();
        assert!(matches!(
            bm.on_operation_end(),
            Some(BufferOperation::Remove { .. })
        ));
        assert!(!bm.has_pending_operations());
        assert!(bm.ranges().is_empty());
        assert!(bm.reconcile().is_empty());
        assert!(!bm.is_segment_buffered(0., 4.));
    }

    #[test]
    fn test_evict_is_clipped_around_anchor() {
        let (mut bm, sink) = new_manager();
        for i in 0..5 {
            push_and_process(&mut bm, &sink, f64::from(i) * 4., f64::from(i + 1) * 4.);
        }
        bm.evict(EvictTarget::After(10.), 10.).unwrap();
        sink.borrow_mut().process_next();
        bm.on_operation_end();
        assert_eq!(bm.reconcile().to_vec(), vec![(0., 11.)]);

        assert_eq!(bm.evict(EvictTarget::Before(20.), 0.5).unwrap(), None);
    }

    #[test]
    fn test_clear_after_covers_pending_push() {
        let (mut bm, sink) = new_manager();
        push_and_process(&mut bm, &sink, 0., 4.);
        push_and_process(&mut bm, &sink, 4., 8.);
        let metadata = MediaSegmentMetadata {
            track_id: 1,
            start: 8.,
            end: 12.,
        };
        bm.push_media(&segment_data(8., 12., 100), metadata).unwrap();

        assert!(bm.clear_after(7.5, 7.5).unwrap().is_some());
        while sink.borrow_mut().process_next().is_some() {
            bm.on_operation_end();
        }
        assert_eq!(sink.borrow().removals, vec![(8.5, f64::INFINITY)]);
        assert_eq!(bm.ranges().to_vec(), vec![(0., 8.5)]);
        assert_eq!(bm.reconcile().to_vec(), vec![(0., 8.5)]);
        assert!(!bm.is_segment_buffered(8., 12.));

        // without pending push, only what is buffered past the anchor is removed
        assert_eq!(bm.clear_after(9., 9.).unwrap(), None);
    }

    #[test]
    fn test_eviction_range() {
        let (mut bm, sink) = new_manager();
        for i in 0..6 {
            push_and_process(&mut bm, &sink, f64::from(i) * 4., f64::from(i + 1) * 4.);
        }
        bm.reconcile();
        // 24s buffered for a 20s maximum
        assert_eq!(bm.eviction_range(12., 1.), Some((0., 4.)));
        // data close to the playhead is kept
        assert_eq!(bm.eviction_range(6., 1.), Some((0., 2.)));
        assert_eq!(bm.eviction_range(3., 1.), None);
        assert_eq!(bm.eviction_range(12., -1.), Some((20., 24.)));

        assert!(bm.evict_excess(12., 1.).unwrap());
        sink.borrow_mut().process_next();
        bm.on_operation_end();
        assert_eq!(bm.reconcile().to_vec(), vec![(4., 24.)]);
        assert_eq!(bm.eviction_range(12., 1.), None);
    }

    #[test]
    fn test_persistent_gap_is_repaired() {
        let (mut bm, sink) = new_manager();
        push_and_process(&mut bm, &sink, 0., 4.);
        push_and_process(&mut bm, &sink, 4., 8.);
        sink.borrow_mut().defect_gaps.push((5., 5.2));
        bm.reconcile();
        assert_eq!(bm.gap_repair_span(0., 1.), None);

        for i in 2..5 {
            push_and_process(&mut bm, &sink, f64::from(i) * 4., f64::from(i + 1) * 4.);
            bm.reconcile();
        }
        assert_eq!(bm.gap_repair_span(0., 1.), Some((4., 8.)));
        // not while the gap is right next to the playhead
        assert_eq!(bm.gap_repair_span(4.5, 1.), None);
        // nor when it is behind it
        assert_eq!(bm.gap_repair_span(10., 1.), None);

        assert!(bm.repair_gaps(0., 1.).unwrap());
        sink.borrow_mut().process_next();
        bm.on_operation_end();
        assert_eq!(bm.reconcile().to_vec(), vec![(0., 4.), (8., 20.)]);
        assert!(!bm.is_segment_buffered(4., 8.));

        push_and_process(&mut bm, &sink, 4., 8.);
        assert_eq!(bm.reconcile().to_vec(), vec![(0., 20.)]);
        assert_eq!(bm.gap_repair_span(0., 1.), None);
    }
}
