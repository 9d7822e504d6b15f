use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

use crate::{
    bindings::MediaType,
    errors::PlayerError,
    stream_controller::StreamState,
};

/// Why the active track of a media type changed on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdaptationReason {
    /// The bandwidth estimate moved enough for another track to be better suited.
    Bandwidth,
    /// The previous track became forbidden by the new `Restrictions`.
    Restrictions,
}

/// Events sent by a `Dispatcher` to each stream returned by `Dispatcher::events`.
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerEvent {
    /// A terminal error happened. Each one is only sent once.
    Error(PlayerError),
    Adaptation {
        media_type: MediaType,
        track_id: u32,
        reason: AdaptationReason,
    },
    StateChange {
        media_type: MediaType,
        state: StreamState,
    },
    /// Data fetched by `Dispatcher::request_license`, with the id it returned.
    LicenseResponse {
        license_id: u32,
        data: Vec<u8>,
    },
    /// Every media type buffered the content until its end.
    Ended,
}

/// Sends `PlayerEvent`s to every subscriber still listening.
#[derive(Default)]
pub(crate) struct EventEmitter {
    subscribers: Vec<UnboundedSender<PlayerEvent>>,
}

impl EventEmitter {
    pub(crate) fn subscribe(&mut self) -> UnboundedReceiver<PlayerEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub(crate) fn emit(&mut self, event: PlayerEvent) {
        self.subscribers
            .retain(|s| s.unbounded_send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use futures::{FutureExt, StreamExt};

    use super::*;

    #[test]
    fn test_dropped_subscribers_are_forgotten() {
        let mut emitter = EventEmitter::default();
        let mut first = emitter.subscribe();
        let second = emitter.subscribe();
        drop(second);
        emitter.emit(PlayerEvent::Ended);
        assert_eq!(emitter.subscribers.len(), 1);
        assert_eq!(first.next().now_or_never(), Some(Some(PlayerEvent::Ended)));
    }
}
