use crate::{
    bindings::{MediaType, RequestId, SinkId, TimerId},
    errors::{BufferError, LoadError, ManifestError, PlayerError},
    requester::{RequestPayload, RetryResult},
    wasm_bindgen, Logger,
};

use super::{Dispatcher, PlayerEvent};

/// Methods the host should call when the work it was asked to perform completes.
///
/// Completions are identified by the id given when that work was started. Completions for
/// ids which are not known anymore, e.g. because the content was stopped since, are ignored.
impl Dispatcher {
    /// The host should call this method each time a request started through its `Fetcher`
    /// finished with success.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier returned by `Fetcher::fetch` when the request
    ///   was started.
    ///
    /// * `data` - The response's body.
    ///
    /// * `duration_ms` - Number of milliseconds taken to perform the request from start to
    ///   finish.
    pub fn on_request_finished(&mut self, request_id: RequestId, data: Vec<u8>, duration_ms: f64) {
        let Some(req) = self.requester.on_pending_request_success(request_id) else {
            Logger::debug(&format!(
                "Core: Ignoring completion of unknown request id:{request_id}"
            ));
            return;
        };
        match req.payload {
            RequestPayload::Manifest => self.on_manifest_loaded(&data, req.url),
            RequestPayload::License(license_id) => {
                self.events
                    .emit(PlayerEvent::LicenseResponse { license_id, data });
            }
            RequestPayload::Segment(info) => {
                if !info.is_init() {
                    self.adaptation.add_metric(duration_ms, data.len() as u64);
                }
                let media_type = info.media_type;
                self.with_controller(
                    |c| c.media_type() == media_type,
                    |c, ctx| c.on_segment_loaded(ctx, &info, &data),
                );
                if media_type == MediaType::Video && !info.is_init() {
                    self.check_best_track();
                }
                self.check_end_of_content();
            }
        }
    }

    /// The host should call this method each time a request started through its `Fetcher`
    /// finished with an error.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier returned by `Fetcher::fetch` when the request
    ///   was started.
    ///
    /// * `has_timeouted` - If `true`, the issue was due to the request timeouting
    ///   with the current request configuration.
    ///
    /// * `status` - If set, the issue was due to a non-satisfying HTTP status being
    ///   received.
    pub fn on_request_failed(&mut self, request_id: RequestId, has_timeouted: bool, status: Option<u32>) {
        let (req, error) =
            match self
                .requester
                .on_pending_request_failure(request_id, has_timeouted, status)
            {
                RetryResult::NotFound | RetryResult::Retried => return,
                RetryResult::Failed(req, error) => (req, error),
            };
        match req.payload {
            RequestPayload::Manifest => {
                self.send_error(
                    PlayerError::new(ManifestError::Unreachable(error)).with_url(req.url),
                );
            }
            RequestPayload::License(_) => {
                self.send_error(PlayerError::new(error).with_url(req.url));
            }
            RequestPayload::Segment(info) => {
                let url = req.url;
                self.with_controller(
                    |c| c.media_type() == info.media_type,
                    |c, ctx| c.on_request_failed(ctx, error, url),
                );
            }
        }
    }

    /// The host should call this method each time the oldest pending operation of a
    /// `MediaSink` ended with success.
    pub fn on_sink_update(&mut self, sink_id: SinkId) {
        let found = self.with_controller(
            |c| c.sink_id() == sink_id,
            |c, ctx| c.on_buffer_operation_end(ctx),
        );
        if found.is_none() {
            Logger::debug(&format!("Core: Ignoring update of unknown sink {sink_id}"));
            return;
        }
        self.check_end_of_content();
    }

    /// The host should call this method when the oldest pending operation of a `MediaSink`
    /// failed.
    pub fn on_sink_error(&mut self, sink_id: SinkId, error: BufferError) {
        let found = self.with_controller(
            |c| c.sink_id() == sink_id,
            |c, ctx| c.on_buffer_error(ctx, error),
        );
        if found.is_none() {
            Logger::debug(&format!("Core: Ignoring error of unknown sink {sink_id}"));
            return;
        }
        self.check_end_of_content();
    }

    /// The host should call this method each time a timer started through its `Fetcher`
    /// finished.
    pub fn on_timer_ended(&mut self, timer_id: TimerId) {
        if !self.requester.on_timer_finished(timer_id) {
            Logger::debug(&format!("Core: Ignoring end of unknown timer {timer_id}"));
        }
    }

    /// The host should call this method regularly while a content is loaded, and at each
    /// important media event (seek operations, stalls, rate changes etc.).
    pub fn on_playback_tick(&mut self, observation: MediaObservation) {
        Logger::debug(&format!(
            "Core: Tick received: {:?} {}",
            observation.reason(),
            observation.current_time()
        ));
        self.media_element_ref.on_observation(observation);
        self.for_each_controller(|c, ctx| c.tick(ctx));
        self.check_end_of_content();
    }

    fn on_manifest_loaded(&mut self, data: &[u8], url: String) {
        let Some(parser) = self.manifest_parser.as_ref() else {
            return;
        };
        let mut manifest = match parser.parse(data, &url) {
            Ok(manifest) => manifest,
            Err(err) => {
                self.send_error(PlayerError::new(err).with_url(url));
                return;
            }
        };
        if manifest.url.is_none() {
            manifest.url = Some(url.clone());
        }
        if let Some(error) = self.load(manifest).err().and_then(LoadError::into_player_error) {
            self.send_error(error.with_url(url));
        }
    }
}

/// Identify the event that lead to the `MediaObservation` being sent.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackTickReason {
    /// This is the initial observation emitted, right after it was started.
    Init,
    /// This designates MediaObservation sent after an interval without any
    /// of the other events.
    RegularInterval,
    /// The media element's "seeking" event has just been triggered
    Seeking,
    /// The media element's "seeked" event has just been triggered
    Seeked,
    /// The media element's "ended" event has just been triggered
    Ended,
    /// The media element's "pause" event has just been triggered
    Pause,
    /// The media element's "play" event has just been triggered
    Play,
    /// The media element's "ratechange" event has just been triggered
    RateChange,
    /// The media element's "stalled" event has just been triggered
    Stalled,
}

/// Playback conditions observed by the host.
#[wasm_bindgen]
#[derive(Clone, Debug, PartialEq)]
pub struct MediaObservation {
    reason: PlaybackTickReason,
    current_time: f64,
    playback_rate: f64,
    paused: bool,
}

#[wasm_bindgen]
impl MediaObservation {
    #[wasm_bindgen(constructor)]
    pub fn new(reason: PlaybackTickReason, current_time: f64, playback_rate: f64, paused: bool) -> Self {
        Self {
            reason,
            current_time,
            playback_rate,
            paused,
        }
    }
}

impl MediaObservation {
    #[inline(always)]
    pub fn reason(&self) -> PlaybackTickReason {
        self.reason
    }

    #[inline(always)]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    #[inline(always)]
    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    #[inline(always)]
    pub fn paused(&self) -> bool {
        self.paused
    }
}
