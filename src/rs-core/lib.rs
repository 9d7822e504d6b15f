use wasm_bindgen::prelude::*;

mod adaptive;
mod bindings;
mod content_tracker;
pub mod dispatcher;
pub mod errors;
pub mod manifest;
mod media_element;
pub mod platform;
mod requester;
mod segment_selector;
mod stream_controller;
mod utils;

pub use bindings::{JsManifest, JsTrack, MediaType, RequestId, SinkId, TimerId, WaspDashPlayer};
pub use content_tracker::{Restrictions, Track};
pub use media_element::PositionWait;
pub use requester::{RequestKind, RequestSettings, RequesterConfiguration};
pub use stream_controller::StreamState;
pub use utils::{
    logger::{Logger, LoggerLevel},
    time_ranges::{TimeRange, TimeRanges},
};
