//! In-memory `platform` implementations driving the core in unit tests.
//!
//! Fetched "segments" carry their own time range as a `seg:<start>:<end>;` prefix, which
//! `FakeSink` reads back to know what an append buffers.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use super::{Fetcher, MediaHost, MediaSink};
use crate::{
    bindings::{MediaType, RequestId, SinkId, TimerId},
    errors::BufferError,
    manifest::ByteRange,
    utils::time_ranges::TimeRanges,
};

#[derive(Clone, Debug)]
pub(crate) struct FakeRequest {
    pub(crate) id: RequestId,
    pub(crate) url: String,
    pub(crate) timeout: Option<f64>,
}

#[derive(Default)]
pub(crate) struct NetworkState {
    next_request_id: RequestId,
    next_timer_id: TimerId,
    pub(crate) pending: Vec<FakeRequest>,
    pub(crate) aborted: Vec<RequestId>,
    pub(crate) timers: Vec<(TimerId, f64)>,
    /// Every url fetched, in order.
    pub(crate) fetched_urls: Vec<String>,
}

impl NetworkState {
    pub(crate) fn take_request(&mut self, id: RequestId) -> Option<FakeRequest> {
        let pos = self.pending.iter().position(|r| r.id == id)?;
        Some(self.pending.remove(pos))
    }
}

pub(crate) struct FakeFetcher(pub(crate) Rc<RefCell<NetworkState>>);

impl Fetcher for FakeFetcher {
    fn fetch(
        &mut self,
        url: &str,
        _byte_range: Option<&ByteRange>,
        timeout_ms: Option<f64>,
    ) -> RequestId {
        let mut state = self.0.borrow_mut();
        state.next_request_id += 1;
        let id = state.next_request_id;
        state.pending.push(FakeRequest {
            id,
            url: url.to_owned(),
            timeout: timeout_ms,
        });
        state.fetched_urls.push(url.to_owned());
        id
    }

    fn abort(&mut self, request_id: RequestId) -> bool {
        let mut state = self.0.borrow_mut();
        let found = state.take_request(request_id).is_some();
        if found {
            state.aborted.push(request_id);
        }
        found
    }

    fn start_timer(&mut self, duration_ms: f64) -> TimerId {
        let mut state = self.0.borrow_mut();
        state.next_timer_id += 1.;
        let id = state.next_timer_id;
        state.timers.push((id, duration_ms));
        id
    }

    fn clear_timer(&mut self, timer_id: TimerId) {
        self.0.borrow_mut().timers.retain(|(id, _)| *id != timer_id);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SinkOperation {
    Append(Vec<u8>),
    Remove(f64, f64),
}

pub(crate) struct SinkState {
    pub(crate) id: SinkId,
    pub(crate) media_type: MediaType,
    /// What the sink really holds.
    pub(crate) buffered: TimeRanges,
    pub(crate) queue: VecDeque<SinkOperation>,
    /// Holes reported by `buffered` until a removal covering them is performed.
    pub(crate) defect_gaps: Vec<(f64, f64)>,
    /// If set, the next `append` call fails synchronously with it.
    pub(crate) append_error: Option<BufferError>,
    pub(crate) appended_segments: Vec<(f64, f64)>,
    pub(crate) removals: Vec<(f64, f64)>,
}

impl SinkState {
    /// Execute the oldest queued operation, as the platform would.
    pub(crate) fn process_next(&mut self) -> Option<SinkOperation> {
        let op = self.queue.pop_front()?;
        match &op {
            SinkOperation::Append(data) => {
                if let Some((start, end)) = parse_segment_data(data) {
                    self.buffered.add(start, end);
                    self.appended_segments.push((start, end));
                }
            }
            SinkOperation::Remove(start, end) => {
                self.buffered.remove_range(*start, *end);
                self.removals.push((*start, *end));
                let (start, end) = (*start, *end);
                self.defect_gaps
                    .retain(|(g_start, g_end)| !(start <= *g_start && end >= *g_end));
            }
        }
        Some(op)
    }

    /// Simulate the platform evicting data on its own.
    pub(crate) fn garbage_collect(&mut self, start: f64, end: f64) {
        self.buffered.remove_range(start, end);
    }
}

pub(crate) struct FakeSink(pub(crate) Rc<RefCell<SinkState>>);

impl MediaSink for FakeSink {
    fn id(&self) -> SinkId {
        self.0.borrow().id
    }

    fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        let mut state = self.0.borrow_mut();
        if let Some(err) = state.append_error.take() {
            return Err(err);
        }
        state.queue.push_back(SinkOperation::Append(data.to_vec()));
        Ok(())
    }

    fn remove(&mut self, start: f64, end: f64) -> Result<(), BufferError> {
        self.0
            .borrow_mut()
            .queue
            .push_back(SinkOperation::Remove(start, end));
        Ok(())
    }

    fn buffered(&self) -> TimeRanges {
        let state = self.0.borrow();
        let mut ranges = state.buffered.clone();
        for (start, end) in &state.defect_gaps {
            ranges.remove_range(*start, *end);
        }
        ranges
    }
}

#[derive(Default)]
pub(crate) struct HostState {
    next_sink_id: SinkId,
    pub(crate) sinks: Vec<Rc<RefCell<SinkState>>>,
    pub(crate) seeks: Vec<f64>,
    pub(crate) playback_rate: Option<f64>,
    pub(crate) end_of_stream_calls: u32,
    pub(crate) fail_sink_creation: bool,
}

impl HostState {
    /// Most recently created sink of that type.
    pub(crate) fn sink(&self, media_type: MediaType) -> Option<Rc<RefCell<SinkState>>> {
        self.sinks
            .iter()
            .rev()
            .find(|s| s.borrow().media_type == media_type)
            .cloned()
    }
}

pub(crate) struct FakeMediaHost(pub(crate) Rc<RefCell<HostState>>);

impl MediaHost for FakeMediaHost {
    fn create_sink(
        &mut self,
        media_type: MediaType,
        _mime_type: &str,
        _codecs: &str,
    ) -> Result<Box<dyn MediaSink>, BufferError> {
        let mut host = self.0.borrow_mut();
        if host.fail_sink_creation {
            return Err(BufferError::SinkUnavailable);
        }
        host.next_sink_id += 1;
        let sink = Rc::new(RefCell::new(SinkState {
            id: host.next_sink_id,
            media_type,
            buffered: TimeRanges::new(),
            queue: VecDeque::new(),
            defect_gaps: vec![],
            append_error: None,
            appended_segments: vec![],
            removals: vec![],
        }));
        host.sinks.push(Rc::clone(&sink));
        Ok(Box::new(FakeSink(sink)))
    }

    fn seek(&mut self, position: f64) {
        self.0.borrow_mut().seeks.push(position);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.0.borrow_mut().playback_rate = Some(rate);
    }

    fn end_of_stream(&mut self) {
        self.0.borrow_mut().end_of_stream_calls += 1;
    }
}

/// Data of a fake media segment covering `[start, end)`, padded to `size` bytes.
pub(crate) fn segment_data(start: f64, end: f64, size: usize) -> Vec<u8> {
    let mut data = format!("seg:{start}:{end};").into_bytes();
    if data.len() < size {
        data.resize(size, 0);
    }
    data
}

fn parse_segment_data(data: &[u8]) -> Option<(f64, f64)> {
    let text = std::str::from_utf8(data.split(|b| *b == b';').next()?).ok()?;
    let mut parts = text.strip_prefix("seg:")?.split(':');
    let start = parts.next()?.parse().ok()?;
    let end = parts.next()?.parse().ok()?;
    Some((start, end))
}
