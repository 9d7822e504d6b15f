use super::{AdaptationReason, Dispatcher, PlayerEvent};
use crate::{
    bindings::MediaType,
    content_tracker::ContentTracker,
    errors::{LoadError, PlayerError, StateError},
    manifest::ManifestInfo,
    stream_controller::{StreamContext, StreamController, StreamState},
    Logger,
};

impl Dispatcher {
    /// Completely stop playback of the current content if one and free all its associated
    /// resources.
    pub(super) fn stop_current_content(&mut self) {
        Logger::info("Core: Stopping current content (if one) and resetting player");
        self.requester.reset();
        self.media_element_ref.reset();
        self.stream_controllers.clear();
        self.content = None;
        self.ended_announced = false;
    }

    /// Create the `StreamController`s of a new content and start loading it.
    ///
    /// The previous content, if any, is expected to be already stopped.
    pub(super) fn start_content(&mut self, manifest: ManifestInfo) -> Result<(), LoadError> {
        manifest.validate()?;
        let mut content =
            ContentTracker::new(manifest, self.restrictions, self.config.text_enabled);
        self.adaptation.reset();

        let media_types = content.manifest().content_types();
        for media_type in &media_types {
            let tracks = content.tracks(*media_type);
            let chosen = if *media_type == MediaType::Video && self.adaptation.is_enabled() {
                self.adaptation.choose_track(&tracks, None)
            } else {
                tracks.first().map(|t| t.id)
            };
            match chosen {
                Some(id) => {
                    content.set_active_track(*media_type, id);
                }
                None => {
                    content.activate_fallback_track(*media_type);
                }
            }
        }

        let mut controllers = Vec::with_capacity(media_types.len());
        for media_type in media_types {
            let (Some(track_id), Some(timeline), Some((mime_type, codecs))) = (
                content.active_track_id(media_type),
                content.active_timeline(media_type),
                content.sink_format(media_type),
            ) else {
                continue;
            };
            let buffer = self
                .media_element_ref
                .create_buffer(media_type, &mime_type, &codecs, self.config.buffer_config())
                .map_err(|source| LoadError::Sink { media_type, source })?;
            controllers.push(StreamController::new(
                media_type,
                track_id,
                timeline,
                buffer,
                self.buffering_goal_for(media_type),
            ));
        }

        self.content = Some(content);
        self.stream_controllers = controllers;
        self.for_each_controller(|c, ctx| c.start(ctx));
        self.check_end_of_content();
        Ok(())
    }

    /// Call `f` on each `StreamController` with a `StreamContext` reflecting the current
    /// playback conditions.
    pub(super) fn for_each_controller(
        &mut self,
        mut f: impl FnMut(&mut StreamController, &mut StreamContext),
    ) {
        let mut ctx = StreamContext {
            requester: &mut self.requester,
            events: &mut self.events,
            position: self.media_element_ref.wanted_position(),
            playback_rate: self.media_element_ref.wanted_speed(),
            paused: self.media_element_ref.is_paused(),
        };
        for controller in self.stream_controllers.iter_mut() {
            f(controller, &mut ctx);
        }
    }

    /// Call `f` on the `StreamController` matching `pred`, if one.
    ///
    /// Returns `None` if no `StreamController` matched.
    pub(super) fn with_controller<T>(
        &mut self,
        pred: impl Fn(&StreamController) -> bool,
        f: impl FnOnce(&mut StreamController, &mut StreamContext) -> T,
    ) -> Option<T> {
        let controller = self.stream_controllers.iter_mut().find(|c| pred(c))?;
        let mut ctx = StreamContext {
            requester: &mut self.requester,
            events: &mut self.events,
            position: self.media_element_ref.wanted_position(),
            playback_rate: self.media_element_ref.wanted_speed(),
            paused: self.media_element_ref.is_paused(),
        };
        Some(f(controller, &mut ctx))
    }

    /// Make `track_id` the active track of `media_type` and switch its `StreamController`
    /// to it.
    pub(super) fn switch_track(
        &mut self,
        media_type: MediaType,
        track_id: u32,
        clear_buffer: bool,
    ) -> Result<(), StateError> {
        let Some(content) = self.content.as_ref() else {
            return Err(StateError::NotLoaded("switch track"));
        };
        let timeline = content.manifest().timeline(media_type, track_id);
        let switched = self.with_controller(
            |c| c.media_type() == media_type,
            |c, ctx| c.switch_track(ctx, track_id, timeline, clear_buffer),
        );
        if let Some(Err(err)) = switched {
            return Err(err);
        }
        if let Some(content) = self.content.as_mut() {
            if content.active_track_id(media_type) != Some(track_id) {
                content.set_active_track(media_type, track_id);
            }
        }
        Ok(())
    }

    /// Check which is the best video track to play according to the current bandwidth
    /// estimate. If it changed, switch to it.
    pub(super) fn check_best_track(&mut self) {
        if !self.adaptation.is_enabled() {
            return;
        }
        let Some(content) = self.content.as_ref() else {
            return;
        };
        let Some(current) = content.active_track_id(MediaType::Video) else {
            return;
        };
        let tracks = content.tracks(MediaType::Video);
        Logger::debug(&format!(
            "Core: New bandwidth estimate: {}",
            self.adaptation.bandwidth_estimate()
        ));
        let Some(best) = self.adaptation.choose_track(&tracks, Some(current)) else {
            return;
        };
        if best == current {
            return;
        }
        Logger::info(&format!(
            "Core: Adapting video track from {current} to {best}"
        ));
        match self.switch_track(MediaType::Video, best, false) {
            Ok(()) => self.events.emit(PlayerEvent::Adaptation {
                media_type: MediaType::Video,
                track_id: best,
                reason: AdaptationReason::Bandwidth,
            }),
            Err(err) => Logger::debug(&format!("Core: Cannot adapt: {err}")),
        }
    }

    /// Signal the end of the content once every `StreamController` buffered until it.
    pub(super) fn check_end_of_content(&mut self) {
        let all_ended = !self.stream_controllers.is_empty()
            && self
                .stream_controllers
                .iter()
                .all(|c| c.state() == StreamState::Ended);
        if all_ended {
            self.media_element_ref.end_of_stream();
            if !self.ended_announced {
                self.ended_announced = true;
                self.events.emit(PlayerEvent::Ended);
            }
        } else if self.ended_announced {
            self.ended_announced = false;
            self.media_element_ref.reopen();
        }
    }

    /// Report an error which is not linked to a `StreamController`.
    pub(super) fn send_error(&mut self, error: PlayerError) {
        Logger::error(&format!("Core: {error}"));
        self.events.emit(PlayerEvent::Error(error));
    }
}
