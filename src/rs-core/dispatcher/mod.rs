use crate::{
    adaptive::AdaptationEngine,
    bindings::MediaType,
    content_tracker::{ContentTracker, Restrictions},
    manifest::ManifestParser,
    media_element::{BufferConfig, MediaElementReference},
    requester::{Requester, RequesterConfiguration},
    stream_controller::StreamController,
};

mod api;
mod core;
mod event_listeners;
mod events;


pub(crate) use events::EventEmitter;
pub use event_listeners::{MediaObservation, PlaybackTickReason};
pub use events::{AdaptationReason, PlayerEvent};

/// The `Dispatcher` is the entry point of the player: it provides an API to load contents and
/// influence various parameters about playback, and receives every completion reported by
/// the host through its event listener methods.
pub struct Dispatcher {
    config: PlayerConfig,

    /// Allows to perform actions related to the host's media element, like creating sinks,
    /// seeking, updating the playback rate etc.
    media_element_ref: MediaElementReference,

    /// Produces bandwidth estimates and chooses the video track to play from them.
    adaptation: AdaptationEngine,

    /// Stores the currently loaded content alongside the state of its tracks.
    ///
    /// `None` if no content is loaded.
    content: Option<ContentTracker>,

    /// Abstraction allowing to perform manifest, segment and license requests, while
    /// easily monitoring requests that are pending.
    requester: Requester,

    /// One per media type of the current content.
    stream_controllers: Vec<StreamController>,

    events: EventEmitter,

    /// Used by `load_url` to turn a fetched manifest into a `ManifestInfo`.
    manifest_parser: Option<Box<dyn ManifestParser>>,

    /// Restrictions for the current content, also applied to the next loaded one.
    restrictions: Restrictions,

    /// Buffering goals set for a single media type, overriding `config.buffering_goal`.
    buffering_goal_overrides: Vec<(MediaType, f64)>,

    /// `true` once `PlayerEvent::Ended` has been sent for the current content.
    ended_announced: bool,

    next_license_id: u32,
}

/// Configuration given to a `Dispatcher` on creation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerConfig {
    /// Amount of buffer, ahead of the current position we want to build in seconds.
    /// Once we reached that point, we won't try to load new segments.
    pub buffering_goal: f64,

    /// Buffered duration, in seconds, for a single media type above which old data is
    /// evicted.
    pub max_buffer_duration: f64,

    /// Duration, in seconds, which is never evicted behind the playhead.
    pub buffer_behind: f64,

    /// Holes in the buffer smaller than this, in seconds, should close by themselves once
    /// the surrounding data is pushed.
    pub closable_gap_threshold: f64,

    /// Number of completed pushes after which a small hole which did not close is repaired
    /// by pushing the data around it again.
    pub gap_repair_attempts: u32,

    /// Bandwidth estimate, in bits per second, used until enough data has been loaded.
    pub initial_bandwidth: f64,

    /// Factor by which the bandwidth estimate is multiplied before choosing a track.
    pub safety_factor: f64,

    pub adaptation_enabled: bool,

    pub text_enabled: bool,

    pub requests: RequesterConfiguration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            buffering_goal: 30.,
            max_buffer_duration: 120.,
            buffer_behind: 10.,
            closable_gap_threshold: 0.5,
            gap_repair_attempts: 3,
            initial_bandwidth: 2_000_000.,
            safety_factor: 0.8,
            adaptation_enabled: true,
            text_enabled: false,
            requests: RequesterConfiguration::default(),
        }
    }
}

impl PlayerConfig {
    pub(crate) fn buffer_config(&self) -> BufferConfig {
        BufferConfig {
            max_buffer_duration: self.max_buffer_duration,
            buffer_behind: self.buffer_behind,
            closable_gap_threshold: self.closable_gap_threshold,
            gap_repair_attempts: self.gap_repair_attempts,
        }
    }
}
