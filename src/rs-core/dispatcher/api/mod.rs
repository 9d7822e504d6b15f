use futures::channel::mpsc::UnboundedReceiver;

use super::{AdaptationReason, Dispatcher, EventEmitter, PlayerConfig, PlayerEvent};
use crate::{
    adaptive::AdaptationEngine,
    bindings::MediaType,
    content_tracker::{Restrictions, Track},
    errors::{LoadError, PlayerError, StateError},
    manifest::{ManifestInfo, ManifestParser},
    media_element::{MediaElementReference, PositionWait},
    platform::{Fetcher, MediaHost},
    requester::{RequestKind, Requester},
    stream_controller::StreamState,
    Logger,
};

/// Methods exposed to the application.
///
/// Note that these are not the only public methods. There's also "event_listeners" which as
/// its name point at, should be called by the host when particular events happen. Such
/// "event_listeners" are defined in their own file.
impl Dispatcher {
    /// Create a new `Dispatcher` performing requests through `fetcher` and pushing media
    /// to sinks created by `host`.
    pub fn new(fetcher: Box<dyn Fetcher>, host: Box<dyn MediaHost>, config: PlayerConfig) -> Self {
        let mut adaptation = AdaptationEngine::new(config.initial_bandwidth, config.safety_factor);
        adaptation.set_enabled(config.adaptation_enabled);
        Dispatcher {
            config,
            media_element_ref: MediaElementReference::new(host),
            adaptation,
            content: None,
            requester: Requester::new(fetcher, config.requests),
            stream_controllers: vec![],
            events: EventEmitter::default(),
            manifest_parser: None,
            restrictions: Restrictions::default(),
            buffering_goal_overrides: vec![],
            ended_announced: false,
            next_license_id: 0,
        }
    }

    /// Set the parser used by `load_url`.
    pub fn with_manifest_parser(mut self, parser: Box<dyn ManifestParser>) -> Self {
        self.manifest_parser = Some(parser);
        self
    }

    /// Returns a new stream of every `PlayerEvent` sent from now on.
    pub fn events(&mut self) -> UnboundedReceiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Stop the current content if one and start loading the given one.
    ///
    /// Nothing from the previous content is reported after this call.
    pub fn load(&mut self, manifest: ManifestInfo) -> Result<(), LoadError> {
        Logger::info("API: load called");
        self.stop_current_content();
        let res = self.start_content(manifest);
        if let Err(err) = &res {
            Logger::error(&format!("API: Cannot load content: {err}"));
            self.stop_current_content();
        }
        res
    }

    /// Stop the current content if one and start loading the manifest at `url`.
    ///
    /// Later errors, including the manifest's, are reported through `PlayerEvent::Error`.
    pub fn load_url(&mut self, url: String) -> Result<(), LoadError> {
        Logger::info("API: load_url called");
        if self.manifest_parser.is_none() {
            return Err(LoadError::NoManifestParser);
        }
        self.stop_current_content();
        self.requester.fetch_manifest(url);
        Ok(())
    }

    /// Stop the current content if one.
    pub fn stop(&mut self) {
        Logger::info("API: stop called");
        self.stop_current_content();
    }

    /// Fetch a license at `url`. Its data is sent through `PlayerEvent::LicenseResponse`
    /// with the id returned here.
    pub fn request_license(&mut self, url: String) -> u32 {
        self.next_license_id = self.next_license_id.wrapping_add(1);
        self.requester.fetch_license(url, self.next_license_id);
        self.next_license_id
    }

    /// Tracks of the given type that the current `Restrictions` allow.
    pub fn eligible_tracks(&self, media_type: MediaType) -> Vec<Track> {
        self.content
            .as_ref()
            .map_or_else(Vec::new, |c| c.tracks(media_type))
    }

    /// Make the track `track_id` the active one for its type.
    ///
    /// With `clear_buffer`, data of the previous track after the playhead is removed.
    /// Returns `false` if the track is unknown, not eligible or if the switch was refused.
    pub fn select_track(&mut self, media_type: MediaType, track_id: u32, clear_buffer: bool) -> bool {
        let Some(content) = self.content.as_ref() else {
            self.send_error(PlayerError::new(StateError::NotLoaded("select track")));
            return false;
        };
        if !content.tracks(media_type).iter().any(|t| t.id == track_id) {
            Logger::warn(&format!(
                "API: Cannot select {media_type} track {track_id}: unknown or not eligible"
            ));
            return false;
        }
        if content.active_track_id(media_type) == Some(track_id) {
            return true;
        }
        match self.switch_track(media_type, track_id, clear_buffer) {
            Ok(()) => {
                self.check_end_of_content();
                true
            }
            Err(err) => {
                self.send_error(PlayerError::new(err).with_media_type(media_type));
                false
            }
        }
    }

    /// Update the `Restrictions` tracks have to satisfy to be selected.
    ///
    /// Active tracks which are not allowed anymore are immediately replaced, even if
    /// adaptation is disabled.
    pub fn set_restrictions(&mut self, restrictions: Restrictions) {
        Logger::info(&format!("API: Setting restrictions {restrictions:?}"));
        self.restrictions = restrictions;
        let Some(content) = self.content.as_mut() else {
            return;
        };
        for (media_type, track_id) in content.set_restrictions(restrictions) {
            match self.switch_track(media_type, track_id, true) {
                Ok(()) => self.events.emit(PlayerEvent::Adaptation {
                    media_type,
                    track_id,
                    reason: AdaptationReason::Restrictions,
                }),
                Err(err) => self.send_error(PlayerError::new(err).with_media_type(media_type)),
            }
        }
        self.check_end_of_content();
    }

    pub fn restrictions(&self) -> Restrictions {
        self.restrictions
    }

    /// Show or hide the active text track. It stays enabled or disabled across text track
    /// changes.
    pub fn set_text_track_enabled(&mut self, enabled: bool) {
        self.config.text_enabled = enabled;
        if let Some(content) = self.content.as_mut() {
            content.set_text_enabled(enabled);
        }
    }

    pub fn set_adaptation_enabled(&mut self, enabled: bool) {
        self.config.adaptation_enabled = enabled;
        self.adaptation.set_enabled(enabled);
    }

    /// Current bandwidth estimate, in bits per second.
    pub fn bandwidth_estimate(&self) -> f64 {
        self.adaptation.bandwidth_estimate()
    }

    /// Update the buffering goal of every media type without its own, see
    /// `set_buffering_goal_for`.
    pub fn set_buffering_goal(&mut self, buffering_goal: f64) {
        self.config.buffering_goal = buffering_goal;
        self.update_buffering_goals();
    }

    pub fn buffering_goal(&self) -> f64 {
        self.config.buffering_goal
    }

    /// Buffering goal applied to the given `MediaType`, its own one if set.
    pub fn buffering_goal_for(&self, media_type: MediaType) -> f64 {
        self.buffering_goal_overrides
            .iter()
            .find(|(t, _)| *t == media_type)
            .map_or(self.config.buffering_goal, |(_, goal)| *goal)
    }

    /// Set a buffering goal for a single media type, `None` to go back to the common one.
    pub fn set_buffering_goal_for(&mut self, media_type: MediaType, buffering_goal: Option<f64>) {
        self.buffering_goal_overrides
            .retain(|(t, _)| *t != media_type);
        if let Some(goal) = buffering_goal {
            self.buffering_goal_overrides.push((media_type, goal));
        }
        self.update_buffering_goals();
    }

    /// Set the timeout, in milliseconds, of requests of the given kind. `None` to disable it.
    ///
    /// Only new requests are affected.
    pub fn set_request_timeout(&mut self, kind: RequestKind, timeout_ms: Option<f64>) {
        self.config.requests.settings_mut(kind).timeout = timeout_ms;
        self.requester.config_mut().settings_mut(kind).timeout = timeout_ms;
    }

    /// Set the amount of times requests of the given kind are retried on temporary errors.
    pub fn set_max_retry(&mut self, kind: RequestKind, max_retry: u32) {
        self.config.requests.settings_mut(kind).max_retry = max_retry;
        self.requester.config_mut().settings_mut(kind).max_retry = max_retry;
    }

    /// Negative rates play the content backward, segments are then loaded behind the
    /// position.
    pub fn set_playback_rate(&mut self, rate: f64) {
        Logger::info(&format!("API: Setting playback rate to {rate}"));
        self.media_element_ref.update_wanted_speed(rate);
        self.for_each_controller(|c, ctx| c.tick(ctx));
        self.check_end_of_content();
    }

    pub fn playback_rate(&self) -> f64 {
        self.media_element_ref.wanted_speed()
    }

    pub fn seek(&mut self, position: f64) {
        self.media_element_ref.seek(position);
        self.for_each_controller(|c, ctx| c.on_seek(ctx));
        self.check_end_of_content();
    }

    /// Last known position, or the wanted one if a seek is pending.
    pub fn position(&self) -> f64 {
        self.media_element_ref.wanted_position()
    }

    /// State of the `MediaType`'s stream, `None` if the current content has none.
    pub fn stream_state(&self, media_type: MediaType) -> Option<StreamState> {
        self.stream_controllers
            .iter()
            .find(|c| c.media_type() == media_type)
            .map(|c| c.state())
    }

    /// Buffered ranges of the `MediaType`'s sink, as last known.
    pub fn buffered(&self, media_type: MediaType) -> Vec<(f64, f64)> {
        self.stream_controllers
            .iter()
            .find(|c| c.media_type() == media_type)
            .map_or_else(Vec::new, |c| c.buffer().ranges().to_vec())
    }

    /// Returns a future resolving once the position passed `position` in the current
    /// playback direction. Dropping it cancels the wait.
    pub fn wait_for_position(&mut self, position: f64) -> PositionWait {
        self.media_element_ref.wait_for_position(position)
    }

    fn update_buffering_goals(&mut self) {
        let goals: Vec<f64> = self
            .stream_controllers
            .iter()
            .map(|c| self.buffering_goal_for(c.media_type()))
            .collect();
        for (controller, goal) in self.stream_controllers.iter_mut().zip(goals) {
            controller.set_buffer_goal(goal);
        }
        self.for_each_controller(|c, ctx| c.tick(ctx));
    }
}
