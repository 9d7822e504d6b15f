use crate::wasm_bindgen;
use std::fmt;

/// # js_functions
///
/// This file lists all JavaScript functions that are callable from Rust as well as
/// struct and enumeration used by those functions.
///
/// Those are only used by the JavaScript-backed `platform` implementations of the
/// `bindings` module: the rest of the core only talks to the `platform` traits.

#[wasm_bindgen]
extern "C" {
    // Log the given text in the JavaScript console, with the log level given.
    pub fn jsLog(log_level: LogLevel, log: &str);

    // Starts a timer for the number of milliseconds indicated by the `duration` argument.
    //
    // Once this timer has elapsed, and unless `jsClearTimer` has been called since with
    // the `TimerId` returned by this function, the `on_timer_ended` method of the
    // `WaspDashPlayer` will be called with the corresponding `TimerId`.
    pub fn jsTimer(duration: f64) -> TimerId;

    // Clear a timer started with `jsTimer`.
    pub fn jsClearTimer(id: TimerId);

    // Fetch the given `url` from the network and await a response.
    //
    // If and when it finishes with success, the data will be given back through the
    // `on_request_finished` method of the `WaspDashPlayer`.
    //
    // If and when it fails, the error will be emitted through the `on_request_failed` method
    // of the `WaspDashPlayer`.
    //
    // In both cases, those methods will always be called asynchronously after the `jsFetch`
    // call.
    //
    // If the request has been aborted while pending through the `jsAbortRequest`
    // function, none of those methods will be called.
    pub fn jsFetch(
        url: &str,
        range_base: Option<usize>,
        range_end: Option<usize>,
        timeout: Option<f64>,
    ) -> RequestId;

    // Abort a request started with `jsFetch` based on its `request_id`.
    //
    // Returns `true` if a pending request with the given RequestId was found and aborted,
    // `false` if no pending request was found with that RequestId.
    pub fn jsAbortRequest(request_id: RequestId) -> bool;

    // Add a SourceBuffer to the MediaSource, for the given mime-type and codecs
    // string (e.g. `video/mp4;codecs="avc1.4d401f"`).
    pub fn jsAddSourceBuffer(media_type: MediaType, typ: &str) -> AddSourceBufferResult;

    // Append media data to the given SourceBuffer.
    //
    // Append and remove operations performed on the same SourceBuffer are executed in the
    // order of their calls. The `on_sink_update` method of the `WaspDashPlayer` is called
    // with the same `sink_id` each time one of them ended with success, `on_sink_error`
    // if it failed.
    pub fn jsAppendBuffer(sink_id: SinkId, data: &[u8]) -> BufferOperationResult;

    // Remove media data from the given SourceBuffer, see `jsAppendBuffer`.
    pub fn jsRemoveBuffer(sink_id: SinkId, start: f64, end: f64) -> BufferOperationResult;

    // Get the content of what has been buffered by the SourceBuffer, in terms of contiguous
    // time ranges, in seconds.
    //
    // The returned vector has an even length: couples of `f64`, the first of which is the
    // start of the contiguous range in seconds and the second the end.
    pub fn jsGetBuffered(sink_id: SinkId) -> Vec<f64>;

    // Call the `MediaSource.prototype.endOfStream` API, allowing to signal that
    // all contents have been pushed to all of its buffer.
    pub fn jsEndOfStream();

    // Method called to change the playback rate (speed of playback).
    pub fn jsSetPlaybackRate(playbackRate: f64);

    // Call the `HTMLMediaElement.prototype.seek` API, allowing to move the current
    // playback's playhead.
    pub fn jsSeek(position: f64);

    pub fn jsSendError(
        code: ErrorCode,
        media_type: Option<MediaType>,
        url: Option<String>,
        message: &str,
    );

    pub fn jsAnnounceAdaptation(media_type: MediaType, track_id: u32, forced: bool);

    pub fn jsAnnounceStreamState(media_type: MediaType, state: &str);

    pub fn jsAnnounceLicense(license_id: u32, data: Vec<u8>);

    pub fn jsAnnounceEnded();

    // Called once the position awaited through the `wait_for_position` method of the
    // `WaspDashPlayer` is reached, with the identifier that method returned.
    //
    // `position` is not set if the wait was cancelled, for example by a new `load` call.
    pub fn jsAnnouncePositionReached(waiter_id: u32, position: Option<f64>);
}

/// Result of calling the `jsAddSourceBuffer` JavaScript function.
///
/// Creation of an `AddSourceBufferResult` should only be performed by the JavaScript side
/// through the exposed static constructors.
#[wasm_bindgen]
pub struct AddSourceBufferResult {
    sink_id: SinkId,
    error: Option<(AddSourceBufferErrorCode, Option<String>)>,
}

#[wasm_bindgen]
impl AddSourceBufferResult {
    pub fn success(sink_id: SinkId) -> Self {
        Self {
            sink_id,
            error: None,
        }
    }

    pub fn error(err: AddSourceBufferErrorCode, desc: Option<String>) -> Self {
        Self {
            sink_id: 0,
            error: Some((err, desc)),
        }
    }
}

impl JsResult<SinkId, AddSourceBufferErrorCode> for AddSourceBufferResult {
    fn result(self) -> Result<SinkId, (AddSourceBufferErrorCode, Option<String>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.sink_id),
        }
    }
}

/// Error that might arise when adding a SourceBuffer through a MediaSource instance.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddSourceBufferErrorCode {
    /// No MediaSource was attached to the media element.
    NoMediaSourceAttached,

    /// A `QuotaExceededError` was received while trying to add the `SourceBuffer`.
    QuotaExceededError,

    /// The given mime-type and codec combination is not supported
    TypeNotSupportedError,

    /// An unknown error happened.
    UnknownError,
}

/// Result of calling either `jsAppendBuffer` or `jsRemoveBuffer`.
#[wasm_bindgen]
pub struct BufferOperationResult {
    error: Option<(BufferOperationErrorCode, Option<String>)>,
}

#[wasm_bindgen]
impl BufferOperationResult {
    pub fn success() -> Self {
        Self { error: None }
    }

    pub fn error(err: BufferOperationErrorCode, desc: Option<String>) -> Self {
        Self {
            error: Some((err, desc)),
        }
    }
}

impl JsResult<(), BufferOperationErrorCode> for BufferOperationResult {
    fn result(self) -> Result<(), (BufferOperationErrorCode, Option<String>)> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Errors that can arise synchronously when scheduling a buffer operation.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferOperationErrorCode {
    /// The SourceBuffer linked to the given `SinkId` was not found.
    NoSourceBuffer,
    /// A `QuotaExceededError` was thrown by the SourceBuffer.
    QuotaExceeded,
    /// The operation failed because of an unknown error.
    UnknownError,
}

/// Error categories communicated through `jsSendError`.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    NetworkTimeout = 0,
    NetworkHttpStatus = 1,
    NetworkAborted = 2,
    BufferAppendFailed = 3,
    BufferQuotaExceeded = 4,
    BufferSinkUnavailable = 5,
    ManifestMalformed = 6,
    ManifestUnreachable = 7,
    StateInvalidTransition = 8,
    StateNotLoaded = 9,
}

/// Levels with which a log can be emitted.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd)]
pub enum LogLevel {
    /// Log level reserved for very important errors and highly unexpected events.
    Error = 0,

    /// Log level reserved for less important errors and unexpected events.
    Warn = 1,

    /// Log level reserved for important events
    Info = 2,

    /// Log level used when debugging. Small-ish yet impactful events should be logged with it.
    Debug = 3,
}

pub(crate) trait JsResult<T, E> {
    fn result(self) -> Result<T, (E, Option<String>)>;
}

/// Identify a pending request.
pub type RequestId = u32;

/// Identify a pending timer.
pub type TimerId = f64;

/// Identify a media sink (a SourceBuffer on the JavaScript-side).
pub type SinkId = u32;

#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Audio = 0,
    Video = 1,
    Text = 2,
}

impl MediaType {
    /// Every `MediaType`, in the order in which their streams are checked.
    pub const ALL: [MediaType; 3] = [MediaType::Video, MediaType::Audio, MediaType::Text];
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MediaType::Audio => "audio",
                MediaType::Video => "video",
                MediaType::Text => "text",
            }
        )
    }
}
