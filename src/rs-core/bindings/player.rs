use futures::{channel::mpsc::UnboundedReceiver, FutureExt, StreamExt};

use crate::{
    content_tracker::{Restrictions, Track},
    dispatcher::{AdaptationReason, Dispatcher, MediaObservation, PlayerConfig, PlayerEvent},
    errors::{LoadError, PlayerError},
    media_element::PositionWait,
    manifest::{
        ByteRange, InitSegmentReference, ManifestInfo, PeriodInfo, SegmentReference, StreamInfo,
        StreamSetInfo,
    },
    requester::RequestKind,
    utils::logger::{Logger, LoggerLevel},
    wasm_bindgen,
};

use super::{
    formatters::{format_error_code_for_js, parse_buffer_operation_error},
    jsAnnounceAdaptation, jsAnnounceEnded, jsAnnounceLicense, jsAnnouncePositionReached,
    jsAnnounceStreamState, jsSendError, BufferOperationErrorCode, JsFetcher, JsMediaHost, MediaType, RequestId, SinkId,
    TimerId,
};

/// The player as exposed to JavaScript.
///
/// Every `PlayerEvent` is relayed to the corresponding `jsAnnounce*` or `jsSendError`
/// function before each method returns.
#[wasm_bindgen]
pub struct WaspDashPlayer {
    dispatcher: Dispatcher,
    events: UnboundedReceiver<PlayerEvent>,
    waiters: PositionWaiters,
}

#[wasm_bindgen]
impl WaspDashPlayer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let mut dispatcher = Dispatcher::new(
            Box::new(JsFetcher),
            Box::new(JsMediaHost),
            PlayerConfig::default(),
        );
        let events = dispatcher.events();
        Self {
            dispatcher,
            events,
            waiters: PositionWaiters::default(),
        }
    }

    pub fn load(&mut self, manifest: JsManifest) {
        if let Some(error) = self
            .dispatcher
            .load(manifest.inner)
            .err()
            .and_then(LoadError::into_player_error)
        {
            send_error(&error);
        }
        self.relay_events();
    }

    pub fn stop(&mut self) {
        self.dispatcher.stop();
        self.relay_events();
    }

    pub fn seek(&mut self, position: f64) {
        self.dispatcher.seek(position);
        self.relay_events();
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.dispatcher.set_playback_rate(rate);
        self.relay_events();
    }

    pub fn select_track(&mut self, media_type: MediaType, track_id: u32, clear_buffer: bool) -> bool {
        let selected = self
            .dispatcher
            .select_track(media_type, track_id, clear_buffer);
        self.relay_events();
        selected
    }

    pub fn set_restrictions(
        &mut self,
        min_width: Option<u32>,
        max_width: Option<u32>,
        min_height: Option<u32>,
        max_height: Option<u32>,
    ) {
        self.dispatcher.set_restrictions(Restrictions {
            min_width,
            max_width,
            min_height,
            max_height,
        });
        self.relay_events();
    }

    pub fn set_log_level(&self, level: LoggerLevel) {
        Logger::set_logger_level(level);
    }

    pub fn set_text_track_enabled(&mut self, enabled: bool) {
        self.dispatcher.set_text_track_enabled(enabled);
    }

    pub fn set_adaptation_enabled(&mut self, enabled: bool) {
        self.dispatcher.set_adaptation_enabled(enabled);
    }

    pub fn set_buffering_goal(&mut self, buffering_goal: f64) {
        self.dispatcher.set_buffering_goal(buffering_goal);
        self.relay_events();
    }

    /// Set a buffering goal for a single media type. Without `buffering_goal`, the one set
    /// through `set_buffering_goal` applies again.
    pub fn set_buffering_goal_for(&mut self, media_type: MediaType, buffering_goal: Option<f64>) {
        self.dispatcher
            .set_buffering_goal_for(media_type, buffering_goal);
        self.relay_events();
    }

    pub fn buffering_goal(&self, media_type: MediaType) -> f64 {
        self.dispatcher.buffering_goal_for(media_type)
    }

    /// Tracks of the given type which can be selected with `select_track`.
    pub fn tracks(&self, media_type: MediaType) -> Vec<JsTrack> {
        self.dispatcher
            .eligible_tracks(media_type)
            .into_iter()
            .map(|inner| JsTrack { inner })
            .collect()
    }

    /// Returns an identifier which will be given to `jsAnnouncePositionReached` once the
    /// position passed `position` in the current playback direction.
    ///
    /// The announce is made at the latest on the next `on_playback_tick` call.
    pub fn wait_for_position(&mut self, position: f64) -> u32 {
        let wait = self.dispatcher.wait_for_position(position);
        self.waiters.add(wait)
    }

    pub fn set_request_timeout(&mut self, kind: RequestKind, timeout_ms: Option<f64>) {
        self.dispatcher.set_request_timeout(kind, timeout_ms);
    }

    pub fn request_license(&mut self, url: String) -> u32 {
        self.dispatcher.request_license(url)
    }

    pub fn bandwidth_estimate(&self) -> f64 {
        self.dispatcher.bandwidth_estimate()
    }

    pub fn stream_state(&self, media_type: MediaType) -> Option<String> {
        self.dispatcher
            .stream_state(media_type)
            .map(|s| s.name().to_owned())
    }

    /// The JS code should call this method each time a request started with `jsFetch`
    /// finished with success.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier returned by `jsFetch`.
    ///
    /// * `data` - The response's body.
    ///
    /// * `duration_ms` - Number of milliseconds taken to perform the request from start to
    ///   finish.
    pub fn on_request_finished(&mut self, request_id: RequestId, data: Vec<u8>, duration_ms: f64) {
        self.dispatcher
            .on_request_finished(request_id, data, duration_ms);
        self.relay_events();
    }

    /// The JS code should call this method each time a request started with `jsFetch`
    /// finished with an error.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The identifier returned by `jsFetch`.
    ///
    /// * `has_timeouted` - If `true`, the issue was due to the request timeouting.
    ///
    /// * `status` - If set, the HTTP status received.
    pub fn on_request_failed(&mut self, request_id: RequestId, has_timeouted: bool, status: Option<u32>) {
        self.dispatcher
            .on_request_failed(request_id, has_timeouted, status);
        self.relay_events();
    }

    /// The JS code should call this method when a SourceBuffer emits an `updateend` event.
    pub fn on_sink_update(&mut self, sink_id: SinkId) {
        self.dispatcher.on_sink_update(sink_id);
        self.relay_events();
    }

    /// The JS code should call this method when a SourceBuffer emits an `error` event.
    pub fn on_sink_error(&mut self, sink_id: SinkId, code: BufferOperationErrorCode, desc: Option<String>) {
        self.dispatcher
            .on_sink_error(sink_id, parse_buffer_operation_error(code, desc));
        self.relay_events();
    }

    /// The JS code should call this method each time a timer started with `jsTimer` ended.
    pub fn on_timer_ended(&mut self, timer_id: TimerId) {
        self.dispatcher.on_timer_ended(timer_id);
        self.relay_events();
    }

    /// The JS code should call this method regularly, and at each important media event
    /// (seek operations, stalls, rate changes etc.).
    pub fn on_playback_tick(&mut self, observation: MediaObservation) {
        self.dispatcher.on_playback_tick(observation);
        self.relay_events();
    }
}

impl Default for WaspDashPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl WaspDashPlayer {
    fn relay_events(&mut self) {
        while let Some(Some(event)) = self.events.next().now_or_never() {
            match event {
                PlayerEvent::Error(error) => send_error(&error),
                PlayerEvent::Adaptation {
                    media_type,
                    track_id,
                    reason,
                } => jsAnnounceAdaptation(
                    media_type,
                    track_id,
                    reason == AdaptationReason::Restrictions,
                ),
                PlayerEvent::StateChange { media_type, state } => {
                    jsAnnounceStreamState(media_type, state.name())
                }
                PlayerEvent::LicenseResponse { license_id, data } => {
                    jsAnnounceLicense(license_id, data)
                }
                PlayerEvent::Ended => jsAnnounceEnded(),
            }
        }
        for (waiter_id, position) in self.waiters.take_settled() {
            jsAnnouncePositionReached(waiter_id, position);
        }
    }
}

/// `PositionWait`s created through `WaspDashPlayer::wait_for_position`, by identifier.
#[derive(Default)]
struct PositionWaiters {
    next_id: u32,
    pending: Vec<(u32, PositionWait)>,
}

impl PositionWaiters {
    fn add(&mut self, wait: PositionWait) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.pending.push((id, wait));
        id
    }

    /// Remove the waits which resolved and return their identifier, with the position reached
    /// or `None` if the wait was cancelled.
    fn take_settled(&mut self) -> Vec<(u32, Option<f64>)> {
        let mut settled = vec![];
        self.pending
            .retain_mut(|(id, wait)| match wait.now_or_never() {
                Some(position) => {
                    settled.push((*id, position));
                    false
                }
                None => true,
            });
        settled
    }
}

/// A track, as returned by `WaspDashPlayer::tracks`.
#[wasm_bindgen]
pub struct JsTrack {
    inner: Track,
}

#[wasm_bindgen]
impl JsTrack {
    #[wasm_bindgen(getter)]
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// Bitrate in bits per second.
    #[wasm_bindgen(getter)]
    pub fn bandwidth(&self) -> f64 {
        self.inner.bandwidth
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> Option<u32> {
        self.inner.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> Option<u32> {
        self.inner.height
    }

    #[wasm_bindgen(getter)]
    pub fn language(&self) -> Option<String> {
        self.inner.language.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn active(&self) -> bool {
        self.inner.active
    }

    #[wasm_bindgen(getter)]
    pub fn enabled(&self) -> bool {
        self.inner.enabled
    }
}

fn send_error(error: &PlayerError) {
    jsSendError(
        format_error_code_for_js(&error.kind),
        error.media_type,
        error.url.clone(),
        &error.to_string(),
    );
}

/// `ManifestInfo` built piece by piece by the JavaScript-side manifest parser.
///
/// Each `add_*` method adds to the element last added one level above. They return `false`
/// when there's no such element.
#[wasm_bindgen]
pub struct JsManifest {
    inner: ManifestInfo,
}

#[wasm_bindgen]
impl JsManifest {
    #[wasm_bindgen(constructor)]
    pub fn new(url: Option<String>) -> Self {
        Self {
            inner: ManifestInfo {
                url,
                periods: vec![],
            },
        }
    }

    pub fn add_period(&mut self, start: f64) {
        self.inner.periods.push(PeriodInfo {
            start,
            stream_sets: vec![],
        });
    }

    pub fn add_stream_set(&mut self, content_type: MediaType, language: Option<String>) -> bool {
        let Some(period) = self.inner.periods.last_mut() else {
            return false;
        };
        period.stream_sets.push(StreamSetInfo {
            content_type,
            language,
            streams: vec![],
        });
        true
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_stream(
        &mut self,
        id: u32,
        bandwidth: f64,
        width: Option<u32>,
        height: Option<u32>,
        mime_type: String,
        codecs: String,
        init_url: Option<String>,
    ) -> bool {
        let Some(set) = self
            .inner
            .periods
            .last_mut()
            .and_then(|p| p.stream_sets.last_mut())
        else {
            return false;
        };
        set.streams.push(StreamInfo {
            id,
            bandwidth,
            width,
            height,
            mime_type,
            codecs,
            init_segment: init_url.map(|url| InitSegmentReference {
                url,
                byte_range: None,
            }),
            segments: vec![],
        });
        true
    }

    pub fn add_segment(
        &mut self,
        start: f64,
        end: f64,
        url: String,
        range_base: Option<usize>,
        range_end: Option<usize>,
    ) -> bool {
        let Some(stream) = self
            .inner
            .periods
            .last_mut()
            .and_then(|p| p.stream_sets.last_mut())
            .and_then(|s| s.streams.last_mut())
        else {
            return false;
        };
        let index = stream.segments.len() as u32;
        stream.segments.push(SegmentReference {
            index,
            start,
            end,
            url,
            byte_range: range_base.map(|first_byte| ByteRange {
                first_byte,
                last_byte: range_end,
            }),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        dispatcher::PlaybackTickReason,
        manifest::tests::{make_manifest, make_set, make_stream},
        platform::testing::{FakeFetcher, FakeMediaHost, HostState, NetworkState},
    };

    fn fake_dispatcher() -> Dispatcher {
        Dispatcher::new(
            Box::new(FakeFetcher(Rc::new(RefCell::new(NetworkState::default())))),
            Box::new(FakeMediaHost(Rc::new(RefCell::new(HostState::default())))),
            PlayerConfig::default(),
        )
    }

    #[test]
    fn test_position_waiters_settle_once() {
        let mut dispatcher = fake_dispatcher();
        let mut waiters = PositionWaiters::default();
        let reached = waiters.add(dispatcher.wait_for_position(0.));
        let later = waiters.add(dispatcher.wait_for_position(10.));
        let cancelled = waiters.add(dispatcher.wait_for_position(30.));
        assert_eq!(waiters.take_settled(), vec![(reached, Some(0.))]);
        assert!(waiters.take_settled().is_empty());

        dispatcher.on_playback_tick(MediaObservation::new(
            PlaybackTickReason::RegularInterval,
            12.,
            1.,
            false,
        ));
        assert_eq!(waiters.take_settled(), vec![(later, Some(12.))]);

        let manifest = make_manifest(vec![make_set(
            MediaType::Video,
            vec![make_stream(1, 1_000_000., Some(720), 5, 4.)],
        )]);
        dispatcher.load(manifest).unwrap();
        assert_eq!(waiters.take_settled(), vec![(cancelled, None)]);
        assert!(waiters.pending.is_empty());
    }

    #[test]
    fn test_track_description() {
        let mut dispatcher = fake_dispatcher();
        let manifest = make_manifest(vec![make_set(
            MediaType::Video,
            vec![
                make_stream(1, 1_000_000., Some(720), 5, 4.),
                make_stream(2, 3_000_000., Some(1080), 5, 4.),
            ],
        )]);
        dispatcher.load(manifest).unwrap();
        let tracks: Vec<JsTrack> = dispatcher
            .eligible_tracks(MediaType::Video)
            .into_iter()
            .map(|inner| JsTrack { inner })
            .collect();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].id(), 2);
        assert_eq!(tracks[1].bandwidth(), 3_000_000.);
        assert_eq!(tracks[1].height(), Some(1080));
        assert_eq!(tracks.iter().filter(|t| t.active()).count(), 1);
    }

    #[test]
    fn test_manifest_builder() {
        let mut manifest = JsManifest::new(Some("https://cdn.test/m.mpd".to_owned()));
        assert!(!manifest.add_stream_set(MediaType::Video, None));
        manifest.add_period(0.);
        assert!(!manifest.add_segment(0., 4., "0.m4s".to_owned(), None, None));
        assert!(manifest.add_stream_set(MediaType::Video, None));
        assert!(manifest.add_stream(
            1,
            1e6,
            Some(1280),
            Some(720),
            "video/mp4".to_owned(),
            "avc1.4d401f".to_owned(),
            Some("init.mp4".to_owned()),
        ));
        assert!(manifest.add_segment(0., 4., "0.m4s".to_owned(), Some(0), Some(999)));
        assert!(manifest.add_segment(4., 8., "1.m4s".to_owned(), None, None));

        let info = &manifest.inner;
        assert_eq!(info.validate(), Ok(()));
        let stream = &info.periods[0].stream_sets[0].streams[0];
        assert_eq!(stream.segments[1].index, 1);
        assert_eq!(
            stream.segments[0].byte_range,
            Some(ByteRange {
                first_byte: 0,
                last_byte: Some(999),
            })
        );
    }
}
