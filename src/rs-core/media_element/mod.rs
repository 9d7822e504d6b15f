use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::channel::oneshot;

use crate::{
    bindings::MediaType,
    dispatcher::{MediaObservation, PlaybackTickReason},
    errors::BufferError,
    platform::MediaHost,
    Logger,
};

pub(crate) use buffer_manager::{
    BufferConfig, BufferManager, BufferOperation, MediaSegmentMetadata,
};

mod buffer_manager;
mod segment_inventory;

/// Distance, in seconds, under which an observed position is considered to be the result of
/// the last seek.
pub(crate) const SEEK_TOLERANCE: f64 = 0.5;

/// Structure linked to the host's media element, which allows to perform media-related actions
/// on it, such as:
///   - creating the sinks media segments are pushed to
///   - seeking
///   - updating the playback rate
///   - keeping track of the current position
pub(crate) struct MediaElementReference {
    host: Box<dyn MediaHost>,

    /// Set when a seek has been asked for but not yet observed.
    queued_seek: Option<f64>,

    /// Stores the last `MediaObservation` received.
    last_observation: Option<MediaObservation>,

    /// The wanted playback rate:
    /// 1. == playback at "normal" speed
    /// 2. == playback at two times the normal speed
    /// -1. == playback in reverse direction but at normal speed
    /// and so on
    wanted_speed: f64,

    /// `1.` when playing forward, `-1.` in reverse. A `0` playback rate keeps the last
    /// direction.
    direction: f64,

    position_waiters: Vec<PositionWaiter>,

    /// `true` once `end_of_stream` has been called on the host for the current content.
    end_of_stream_signaled: bool,
}

struct PositionWaiter {
    target: f64,
    sender: oneshot::Sender<f64>,
}

impl MediaElementReference {
    pub(crate) fn new(host: Box<dyn MediaHost>) -> Self {
        Self {
            host,
            queued_seek: None,
            last_observation: None,
            wanted_speed: 1.,
            direction: 1.,
            position_waiters: vec![],
            end_of_stream_signaled: false,
        }
    }

    /// Reset this `MediaElementReference` to its initial state, for a new content.
    ///
    /// Pending `PositionWait`s resolve to `None`.
    pub(crate) fn reset(&mut self) {
        self.queued_seek = None;
        self.last_observation = None;
        self.position_waiters.clear();
        self.end_of_stream_signaled = false;
    }

    /// Create the sink in which segments of the given `MediaType` will be pushed.
    pub(crate) fn create_buffer(
        &mut self,
        media_type: MediaType,
        mime_type: &str,
        codecs: &str,
        config: BufferConfig,
    ) -> Result<BufferManager, BufferError> {
        Logger::info(&format!(
            "Creating new {media_type} sink ({mime_type}; codecs=\"{codecs}\")"
        ));
        let sink = self.host.create_sink(media_type, mime_type, codecs)?;
        Ok(BufferManager::new(media_type, sink, config))
    }

    /// Returns the currently wanted position.
    ///
    /// That is:
    ///
    ///   - If a seek has been asked for but has not been observed yet, the position for that
    ///     seek
    ///
    ///   - Else the last observed position, `0` if none.
    pub(crate) fn wanted_position(&self) -> f64 {
        self.queued_seek.unwrap_or_else(|| {
            self.last_observation
                .as_ref()
                .map_or(0., |o| o.current_time())
        })
    }

    pub(crate) fn seek(&mut self, position: f64) {
        Logger::info(&format!("Seeking to {position}"));
        self.queued_seek = Some(position);
        self.host.seek(position);
        self.resolve_waiters(position);
    }

    /// Returns the wanted playback rate
    pub(crate) fn wanted_speed(&self) -> f64 {
        self.wanted_speed
    }

    /// Updates the wanted playback rate
    /// Note that playback effects will only happen asynchronously
    pub(crate) fn update_wanted_speed(&mut self, new_speed: f64) {
        self.wanted_speed = new_speed;
        if new_speed != 0. {
            self.direction = new_speed.signum();
        }
        self.host.set_playback_rate(new_speed);
    }

    /// Playback rate to consider to know in which direction segments are loaded: never `0`.
    #[cfg(test)]
    pub(crate) fn direction(&self) -> f64 {
        self.direction
    }

    /// Returns `true` if content is not currently advancing.
    pub(crate) fn is_paused(&self) -> bool {
        self.wanted_speed == 0.
            || self
                .last_observation
                .as_ref()
                .map_or(true, |o| o.paused() || o.playback_rate() == 0.)
    }

    /// Method to call once a `MediaObservation` has been received.
    pub(crate) fn on_observation(&mut self, observation: MediaObservation) {
        if let Some(seek_pos) = self.queued_seek {
            if observation.reason() == PlaybackTickReason::Seeked
                || (observation.current_time() - seek_pos).abs() < SEEK_TOLERANCE
            {
                self.queued_seek = None;
            }
        }
        let position = observation.current_time();
        self.last_observation = Some(observation);
        if self.queued_seek.is_none() {
            self.resolve_waiters(position);
        }
    }

    /// Create a future resolving once the position passed `target` in the current playback
    /// direction.
    pub(crate) fn wait_for_position(&mut self, target: f64) -> PositionWait {
        let (sender, receiver) = oneshot::channel();
        let position = self.wanted_position();
        if self.has_reached(position, target) {
            let _ = sender.send(position);
        } else {
            self.position_waiters.push(PositionWaiter { target, sender });
        }
        PositionWait { receiver }
    }

    /// Indicate to the host that the last segment of every buffer has been pushed.
    ///
    /// Only the first call until `reopen` or `reset` has an effect.
    pub(crate) fn end_of_stream(&mut self) {
        if !self.end_of_stream_signaled {
            Logger::info("Signaling end of stream");
            self.end_of_stream_signaled = true;
            self.host.end_of_stream();
        }
    }

    /// To call when data has to be pushed again after `end_of_stream` was called.
    pub(crate) fn reopen(&mut self) {
        self.end_of_stream_signaled = false;
    }

    fn has_reached(&self, position: f64, target: f64) -> bool {
        if self.direction < 0. {
            position <= target
        } else {
            position >= target
        }
    }

    fn resolve_waiters(&mut self, position: f64) {
        let waiters = std::mem::take(&mut self.position_waiters);
        for waiter in waiters {
            if waiter.sender.is_canceled() {
                continue;
            }
            if self.has_reached(position, waiter.target) {
                let _ = waiter.sender.send(position);
            } else {
                self.position_waiters.push(waiter);
            }
        }
    }
}

/// Future returned by `Dispatcher::wait_for_position`.
///
/// Resolves to the observed position once it passed the wanted one, or to `None` if the
/// content was stopped or replaced before. Dropping it cancels the wait.
#[derive(Debug)]
pub struct PositionWait {
    receiver: oneshot::Receiver<f64>,
}

impl Future for PositionWait {
    type Output = Option<f64>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(Result::ok)
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use futures::FutureExt;

    use super::*;
    use crate::platform::testing::{FakeMediaHost, HostState};

    fn new_media_element() -> (MediaElementReference, Rc<RefCell<HostState>>) {
        let host_state = Rc::new(RefCell::new(HostState::default()));
        let host = FakeMediaHost(Rc::clone(&host_state));
        (MediaElementReference::new(Box::new(host)), host_state)
    }

    fn observe(media_element: &mut MediaElementReference, current_time: f64, rate: f64) {
        media_element.on_observation(MediaObservation::new(
            PlaybackTickReason::RegularInterval,
            current_time,
            rate,
            false,
        ));
    }

    #[test]
    fn test_position_waiter_forward_and_reverse() {
        let (mut media_element, _) = new_media_element();
        let mut wait = media_element.wait_for_position(5.);
        observe(&mut media_element, 2., 1.);
        assert_eq!((&mut wait).now_or_never(), None);
        observe(&mut media_element, 5.1, 1.);
        assert_eq!(wait.now_or_never(), Some(Some(5.1)));

        media_element.update_wanted_speed(-2.);
        let mut wait = media_element.wait_for_position(3.);
        observe(&mut media_element, 4., -2.);
        assert_eq!((&mut wait).now_or_never(), None);
        observe(&mut media_element, 2.9, -2.);
        assert_eq!(wait.now_or_never(), Some(Some(2.9)));
    }

    #[test]
    fn test_position_waiter_cancellation() {
        let (mut media_element, _) = new_media_element();
        let wait = media_element.wait_for_position(5.);
        drop(wait);
        observe(&mut media_element, 1., 1.);
        assert!(media_element.position_waiters.is_empty());

        let wait = media_element.wait_for_position(10.);
        media_element.reset();
        assert_eq!(wait.now_or_never(), Some(None));
    }

    #[test]
    fn test_zero_rate_keeps_direction() {
        let (mut media_element, host) = new_media_element();
        media_element.update_wanted_speed(-1.);
        media_element.update_wanted_speed(0.);
        assert_eq!(media_element.direction(), -1.);
        assert!(media_element.is_paused());
        assert_eq!(host.borrow().playback_rate, Some(0.));
    }

    #[test]
    fn test_end_of_stream_is_signaled_once() {
        let (mut media_element, host) = new_media_element();
        media_element.end_of_stream();
        media_element.end_of_stream();
        assert_eq!(host.borrow().end_of_stream_calls, 1);
        media_element.reopen();
        media_element.end_of_stream();
        assert_eq!(host.borrow().end_of_stream_calls, 2);
    }
}
