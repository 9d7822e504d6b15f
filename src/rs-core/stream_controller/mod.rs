use std::fmt;

use crate::{
    bindings::{MediaType, SinkId},
    dispatcher::{EventEmitter, PlayerEvent},
    errors::{BufferError, NetworkError, PlayerError, PlayerErrorKind, StateError},
    manifest::Timeline,
    media_element::{BufferManager, BufferOperation, MediaSegmentMetadata, SEEK_TOLERANCE},
    requester::{Requester, SegmentRequestInfo},
    segment_selector::{NextSegmentInfo, NextSegmentSelector},
    Logger,
};

/// Buffering state of a `StreamController`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Waiting for the first media segment to be pushed, after a load or a seek outside the
    /// buffer.
    Init,
    /// Maintaining the buffer ahead of the playhead.
    Updating,
    /// The active track changed, waiting for a segment of the new one to be pushed.
    Switching,
    /// Everything until the end of the content is buffered.
    Ended,
    /// Stopped for good after an error.
    Errored,
}

impl StreamState {
    pub fn name(&self) -> &'static str {
        match self {
            StreamState::Init => "init",
            StreamState::Updating => "updating",
            StreamState::Switching => "switching",
            StreamState::Ended => "ended",
            StreamState::Errored => "errored",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a `StreamController` needs from its owner for a single step.
pub(crate) struct StreamContext<'a> {
    pub(crate) requester: &'a mut Requester,
    pub(crate) events: &'a mut EventEmitter,
    /// Current (or wanted, when seeking) playback position, in seconds.
    pub(crate) position: f64,
    pub(crate) playback_rate: f64,
    pub(crate) paused: bool,
}

/// Loads and pushes segments of a single media type.
///
/// At most one segment request and one buffer operation are pending at any time, nothing new
/// is started before the previous one ended.
pub(crate) struct StreamController {
    media_type: MediaType,
    state: StreamState,
    track_id: u32,
    timeline: Timeline,
    buffer: BufferManager,
    selector: NextSegmentSelector,
}

impl StreamController {
    pub(crate) fn new(
        media_type: MediaType,
        track_id: u32,
        timeline: Timeline,
        buffer: BufferManager,
        buffer_goal: f64,
    ) -> Self {
        Self {
            media_type,
            state: StreamState::Init,
            track_id,
            timeline,
            buffer,
            selector: NextSegmentSelector::new(0., buffer_goal),
        }
    }

    pub(crate) fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub(crate) fn state(&self) -> StreamState {
        self.state
    }

    pub(crate) fn sink_id(&self) -> SinkId {
        self.buffer.sink_id()
    }

    pub(crate) fn buffer(&self) -> &BufferManager {
        &self.buffer
    }

    pub(crate) fn set_buffer_goal(&mut self, buffer_goal: f64) {
        self.selector.update_buffer_goal(buffer_goal);
    }

    /// Announce the initial state and start loading segments.
    pub(crate) fn start(&mut self, ctx: &mut StreamContext) {
        Logger::info(&format!(
            "SC: Starting {} stream with track {}",
            self.media_type, self.track_id
        ));
        ctx.events.emit(PlayerEvent::StateChange {
            media_type: self.media_type,
            state: self.state,
        });
        self.tick(ctx);
    }

    /// Check whether a segment has to be loaded, or data removed, and do it.
    pub(crate) fn tick(&mut self, ctx: &mut StreamContext) {
        if self.state == StreamState::Errored {
            return;
        }
        self.selector.update_base_position(ctx.position);
        self.selector.update_playback_rate(ctx.playback_rate);
        if ctx.requester.has_segment_request_pending(self.media_type)
            || self.buffer.has_pending_operations()
        {
            return;
        }
        self.buffer.reconcile();

        let direction = if self.selector.is_reverse() { -1. } else { 1. };
        let repaired = if !ctx.paused && ctx.playback_rate != 0. {
            self.buffer.repair_gaps(ctx.position, direction)
        } else {
            Ok(false)
        };
        let removal = match repaired {
            Ok(false) => self.buffer.evict_excess(ctx.position, direction),
            other => other,
        };
        match removal {
            Ok(false) => self.load_next_segment(ctx),
            // ticked again once the removal is done
            Ok(true) => {}
            Err(err) => self.fail(ctx, err.into(), None),
        }
    }

    /// To call when the position has been moved by the user.
    pub(crate) fn on_seek(&mut self, ctx: &mut StreamContext) {
        if self.state == StreamState::Errored {
            return;
        }
        let target = ctx.position;
        self.selector.update_base_position(target);
        let at_content_end = self.timeline.last_end().is_some_and(|end| target >= end);
        let buffered = self.buffer.reconcile();
        let in_buffer = buffered.contains(target)
            || buffered
                .iter()
                .any(|r| target >= r.end() && target - r.end() <= SEEK_TOLERANCE);
        if at_content_end || in_buffer {
            Logger::debug(&format!(
                "SC: {} seek to {target} inside the buffer",
                self.media_type
            ));
            if self.state != StreamState::Init {
                self.set_state(ctx, StreamState::Updating);
            }
            self.tick(ctx);
            return;
        }

        Logger::info(&format!(
            "SC: {} seek to {target} outside the buffer, flushing it",
            self.media_type
        ));
        ctx.requester.abort_segments_with_type(self.media_type);
        if let Err(err) = self.buffer.flush() {
            self.fail(ctx, err.into(), None);
            return;
        }
        self.set_state(ctx, StreamState::Init);
        self.load_next_segment(ctx);
    }

    /// Change the track segments are loaded from.
    ///
    /// With `clear_buffer`, data after the playhead is removed, else it is kept and only
    /// new segments come from the new track.
    pub(crate) fn switch_track(
        &mut self,
        ctx: &mut StreamContext,
        track_id: u32,
        timeline: Timeline,
        clear_buffer: bool,
    ) -> Result<(), StateError> {
        if self.state == StreamState::Errored {
            return Err(StateError::InvalidTransition {
                operation: "switch track",
                media_type: self.media_type,
                state: self.state.name(),
            });
        }
        Logger::info(&format!(
            "SC: {} switching from track {} to {track_id} (clear: {clear_buffer})",
            self.media_type, self.track_id
        ));
        ctx.requester.abort_segments_with_type(self.media_type);
        self.track_id = track_id;
        self.timeline = timeline;
        if self.state != StreamState::Init {
            if clear_buffer {
                if let Err(err) = self.buffer.clear_after(ctx.position, ctx.position) {
                    self.fail(ctx, err.into(), None);
                    return Ok(());
                }
            }
            self.set_state(ctx, StreamState::Switching);
        }
        self.tick(ctx);
        Ok(())
    }

    /// To call once a segment requested by this `StreamController` has been loaded.
    pub(crate) fn on_segment_loaded(
        &mut self,
        ctx: &mut StreamContext,
        info: &SegmentRequestInfo,
        data: &[u8],
    ) {
        if self.state == StreamState::Errored {
            return;
        }
        if info.track_id != self.track_id {
            Logger::debug(&format!(
                "SC: {} ignoring segment of previous track {}",
                self.media_type, info.track_id
            ));
            self.tick(ctx);
            return;
        }
        let pushed = match (info.time_info, info.init) {
            (Some((start, end)), _) => self.buffer.push_media(
                data,
                MediaSegmentMetadata {
                    track_id: info.track_id,
                    start,
                    end,
                },
            ),
            (None, Some(init)) => self.buffer.push_init(data, info.track_id, init),
            (None, None) => return,
        };
        if let Err(err) = pushed {
            self.fail(ctx, err.into(), None);
        }
    }

    /// To call once the sink reported the end of its oldest pending operation.
    pub(crate) fn on_buffer_operation_end(&mut self, ctx: &mut StreamContext) {
        let Some(op) = self.buffer.on_operation_end() else {
            return;
        };
        if let BufferOperation::PushMedia { op_id, metadata } = op {
            let awaiting_push = matches!(self.state, StreamState::Init | StreamState::Switching);
            if awaiting_push
                && metadata.track_id == self.track_id
                && !self.buffer.is_discarded(op_id)
            {
                self.set_state(ctx, StreamState::Updating);
            }
        }
        self.tick(ctx);
    }

    pub(crate) fn on_request_failed(&mut self, ctx: &mut StreamContext, error: NetworkError, url: String) {
        self.fail(ctx, error.into(), Some(url));
    }

    pub(crate) fn on_buffer_error(&mut self, ctx: &mut StreamContext, error: BufferError) {
        self.fail(ctx, error.into(), None);
    }

    fn load_next_segment(&mut self, ctx: &mut StreamContext) {
        let buffer = &self.buffer;
        let next = self.selector.get_next_segment_info(
            &self.timeline,
            self.track_id,
            buffer.last_pushed_init(),
            |start, end| buffer.is_segment_buffered(start, end),
        );
        match next {
            NextSegmentInfo::None => {
                if self.state == StreamState::Switching {
                    self.set_state(ctx, StreamState::Updating);
                }
            }
            NextSegmentInfo::InitSegment(key, init) => {
                ctx.requester
                    .request_init_segment(self.media_type, self.track_id, key, init);
            }
            NextSegmentInfo::MediaSegment(segment) => {
                ctx.requester
                    .request_media_segment(self.media_type, self.track_id, segment);
                if self.state == StreamState::Ended {
                    self.set_state(ctx, StreamState::Updating);
                }
            }
            NextSegmentInfo::EndOfContent => {
                if self.state != StreamState::Ended {
                    self.set_state(ctx, StreamState::Ended);
                }
            }
        }
    }

    fn set_state(&mut self, ctx: &mut StreamContext, state: StreamState) {
        if self.state == state {
            return;
        }
        Logger::info(&format!(
            "SC: {} stream {} -> {}",
            self.media_type, self.state, state
        ));
        self.state = state;
        ctx.events.emit(PlayerEvent::StateChange {
            media_type: self.media_type,
            state,
        });
    }

    fn fail(&mut self, ctx: &mut StreamContext, kind: PlayerErrorKind, url: Option<String>) {
        if self.state == StreamState::Errored {
            return;
        }
        Logger::error(&format!("SC: {} stream failed: {kind}", self.media_type));
        ctx.requester.abort_segments_with_type(self.media_type);
        let mut error = PlayerError::new(kind)
            .with_media_type(self.media_type)
            .with_buffered(self.buffer.ranges());
        if let Some(url) = url {
            error = error.with_url(url);
        }
        self.set_state(ctx, StreamState::Errored);
        ctx.events.emit(PlayerEvent::Error(error));
    }
}
