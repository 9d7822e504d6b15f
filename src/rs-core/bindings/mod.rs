//! JavaScript host of the player.
//!
//! `platform` traits are implemented on top of the functions imported in `js_functions`,
//! and `WaspDashPlayer` exposes the `Dispatcher` to JavaScript.

mod formatters;
mod js_functions;
mod player;

pub use js_functions::*;
pub use player::{JsManifest, JsTrack, WaspDashPlayer};

use crate::{
    errors::BufferError,
    manifest::ByteRange,
    platform::{Fetcher, MediaHost, MediaSink},
    utils::time_ranges::TimeRanges,
};

use self::formatters::{
    format_range_for_js, parse_add_source_buffer_error, parse_buffer_operation_error,
};

/// `Fetcher` relying on `jsFetch` and `jsTimer`.
pub(crate) struct JsFetcher;

impl Fetcher for JsFetcher {
    fn fetch(
        &mut self,
        url: &str,
        byte_range: Option<&ByteRange>,
        timeout_ms: Option<f64>,
    ) -> RequestId {
        let (range_base, range_end) = format_range_for_js(byte_range);
        jsFetch(url, range_base, range_end, timeout_ms)
    }

    fn abort(&mut self, request_id: RequestId) -> bool {
        jsAbortRequest(request_id)
    }

    fn start_timer(&mut self, duration_ms: f64) -> TimerId {
        jsTimer(duration_ms)
    }

    fn clear_timer(&mut self, timer_id: TimerId) {
        jsClearTimer(timer_id)
    }
}

/// `MediaHost` controlling the JavaScript-side media element and its MediaSource.
pub(crate) struct JsMediaHost;

impl MediaHost for JsMediaHost {
    fn create_sink(
        &mut self,
        media_type: MediaType,
        mime_type: &str,
        codecs: &str,
    ) -> Result<Box<dyn MediaSink>, BufferError> {
        let typ = format!("{mime_type};codecs=\"{codecs}\"");
        match jsAddSourceBuffer(media_type, &typ).result() {
            Ok(id) => Ok(Box::new(JsSink { id })),
            Err((code, desc)) => Err(parse_add_source_buffer_error(code, desc)),
        }
    }

    fn seek(&mut self, position: f64) {
        jsSeek(position);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        jsSetPlaybackRate(rate);
    }

    fn end_of_stream(&mut self) {
        jsEndOfStream();
    }
}

/// A SourceBuffer on the JavaScript-side.
struct JsSink {
    id: SinkId,
}

impl MediaSink for JsSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        jsAppendBuffer(self.id, data)
            .result()
            .map_err(|(code, desc)| parse_buffer_operation_error(code, desc))
    }

    fn remove(&mut self, start: f64, end: f64) -> Result<(), BufferError> {
        jsRemoveBuffer(self.id, start, end)
            .result()
            .map_err(|(code, desc)| parse_buffer_operation_error(code, desc))
    }

    fn buffered(&self) -> TimeRanges {
        let flat = jsGetBuffered(self.id);
        TimeRanges::from_ranges(flat.chunks_exact(2).map(|r| (r[0], r[1])))
    }
}
