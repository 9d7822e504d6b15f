use thiserror::Error;

use crate::{bindings::MediaType, utils::time_ranges::TimeRanges};

/// Failure of a network request, once retries (if any) are exhausted.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum NetworkError {
    #[error("the request timed out")]
    Timeout,
    #[error("the request failed with HTTP status {0}")]
    HttpStatus(u32),
    #[error("the request was aborted")]
    Aborted,
}

/// Failure of the media sink linked to a `BufferManager`.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum BufferError {
    #[error("could not append data: {0}")]
    AppendFailed(String),
    #[error("the media buffer is full")]
    QuotaExceeded,
    #[error("the media sink is not available")]
    SinkUnavailable,
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum ManifestError {
    #[error("malformed manifest: {0}")]
    Malformed(String),
    #[error("manifest unreachable: {0}")]
    Unreachable(NetworkError),
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum StateError {
    #[error("cannot {operation} while the {media_type} stream is {state}")]
    InvalidTransition {
        operation: &'static str,
        media_type: MediaType,
        state: &'static str,
    },
    #[error("cannot {0}: no content is loaded")]
    NotLoaded(&'static str),
}

/// Every error category the player can report.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum PlayerErrorKind {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Error reported through `PlayerEvent::Error`, with the context needed to diagnose it.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("{kind}")]
pub struct PlayerError {
    pub kind: PlayerErrorKind,
    /// Media type concerned, `None` for content-wide errors.
    pub media_type: Option<MediaType>,
    /// Last known buffered ranges for that media type when the error happened.
    pub buffered: Vec<(f64, f64)>,
    /// Url of the failing resource, if one.
    pub url: Option<String>,
}

impl PlayerError {
    pub(crate) fn new(kind: impl Into<PlayerErrorKind>) -> Self {
        Self {
            kind: kind.into(),
            media_type: None,
            buffered: vec![],
            url: None,
        }
    }

    pub(crate) fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = Some(media_type);
        self
    }

    pub(crate) fn with_buffered(mut self, buffered: &TimeRanges) -> Self {
        self.buffered = buffered.to_vec();
        self
    }

    pub(crate) fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Error returned by `Dispatcher::load`.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("no manifest parser is configured")]
    NoManifestParser,
    #[error("could not create the {media_type} sink: {source}")]
    Sink {
        media_type: MediaType,
        source: BufferError,
    },
}

impl LoadError {
    /// The error to report to the application, `None` when there's nothing to report.
    pub fn into_player_error(self) -> Option<PlayerError> {
        match self {
            LoadError::Manifest(err) => Some(PlayerError::new(err)),
            LoadError::Sink { media_type, source } => {
                Some(PlayerError::new(source).with_media_type(media_type))
            }
            LoadError::NoManifestParser => None,
        }
    }
}
