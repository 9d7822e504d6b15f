//! Capabilities the core expects from its host.
//!
//! Each of those calls is synchronous and only schedules work: completions come back later
//! through the `Dispatcher`'s event listener methods (`on_request_finished`,
//! `on_sink_update`, `on_timer_ended`...), identified by the id returned here.
//!
//! The `bindings` module implements them on top of JavaScript functions. Any other host
//! (or a test) can provide its own implementations.

use crate::{
    bindings::{MediaType, RequestId, SinkId, TimerId},
    errors::BufferError,
    manifest::ByteRange,
    utils::time_ranges::TimeRanges,
};

#[cfg(test)]
pub(crate) mod testing;

/// Performs HTTP(S) requests and timers.
pub trait Fetcher {
    /// Start fetching `url`, optionally only the given `byte_range` of it.
    ///
    /// `timeout_ms` set to `None` means no timeout.
    fn fetch(&mut self, url: &str, byte_range: Option<&ByteRange>, timeout_ms: Option<f64>)
        -> RequestId;

    /// Abort a pending request. No completion should be reported for it afterwards.
    ///
    /// Returns `false` if no pending request had that id.
    fn abort(&mut self, request_id: RequestId) -> bool;

    /// Start a timer, its end will be reported through `Dispatcher::on_timer_ended`.
    fn start_timer(&mut self, duration_ms: f64) -> TimerId;

    fn clear_timer(&mut self, timer_id: TimerId);
}

/// Controls the playback element of the host.
pub trait MediaHost {
    /// Create the sink in which media segments of the given type will be pushed.
    fn create_sink(
        &mut self,
        media_type: MediaType,
        mime_type: &str,
        codecs: &str,
    ) -> Result<Box<dyn MediaSink>, BufferError>;

    fn seek(&mut self, position: f64);

    fn set_playback_rate(&mut self, rate: f64);

    /// Signal that the last segment of every media type has been pushed.
    fn end_of_stream(&mut self);
}

/// Platform-managed playback buffer for a single media type.
///
/// Operations are executed in call order. The end of each one of them must be reported
/// through `Dispatcher::on_sink_update` (or `Dispatcher::on_sink_error`) with this sink's id.
pub trait MediaSink {
    fn id(&self) -> SinkId;

    fn append(&mut self, data: &[u8]) -> Result<(), BufferError>;

    fn remove(&mut self, start: f64, end: f64) -> Result<(), BufferError>;

    /// What is actually buffered right now, which may differ from what has been appended.
    fn buffered(&self) -> TimeRanges;
}
