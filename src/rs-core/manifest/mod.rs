//! Object model of an already-parsed segmented manifest.
//!
//! Parsing is not done here: an external `ManifestParser` builds a `ManifestInfo`, which
//! is then handed to the `Dispatcher`.

use std::{cmp::Ordering, collections::HashSet};

use crate::{bindings::MediaType, errors::ManifestError};

/// Transform raw manifest data into a `ManifestInfo`.
pub trait ManifestParser {
    fn parse(&self, data: &[u8], url: &str) -> Result<ManifestInfo, ManifestError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ManifestInfo {
    /// Url the manifest was loaded from, if known.
    pub url: Option<String>,
    pub periods: Vec<PeriodInfo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PeriodInfo {
    /// Start of the period, in seconds, on the presentation timeline.
    pub start: f64,
    pub stream_sets: Vec<StreamSetInfo>,
}

/// Group of interchangeable streams, e.g. every video quality of a content.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamSetInfo {
    pub content_type: MediaType,
    pub language: Option<String>,
    pub streams: Vec<StreamInfo>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    /// Identifier, unique per content type inside a period and stable across periods.
    pub id: u32,
    /// Bitrate in bits per second.
    pub bandwidth: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mime_type: String,
    pub codecs: String,
    pub init_segment: Option<InitSegmentReference>,
    /// Media segments, with times relative to the start of their period.
    pub segments: Vec<SegmentReference>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitSegmentReference {
    pub url: String,
    pub byte_range: Option<ByteRange>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentReference {
    pub index: u32,
    /// Start in seconds, inclusive.
    pub start: f64,
    /// End in seconds, exclusive.
    pub end: f64,
    pub url: String,
    pub byte_range: Option<ByteRange>,
}

impl SegmentReference {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteRange {
    pub first_byte: usize,
    /// Last byte, inclusive. `None` to read until the end of the resource.
    pub last_byte: Option<usize>,
}

/// Index of an initialization segment inside a `Timeline`.
pub(crate) type InitKey = usize;

/// Every segment of a single track through all periods, on the presentation timeline.
#[derive(Clone, Debug, Default)]
pub(crate) struct Timeline {
    pub(crate) inits: Vec<InitSegmentReference>,
    pub(crate) segments: Vec<TimelineSegment>,
}

#[derive(Clone, Debug)]
pub(crate) struct TimelineSegment {
    pub(crate) reference: SegmentReference,
    /// Initialization segment that has to be pushed before this one.
    pub(crate) init: Option<InitKey>,
}

impl Timeline {
    pub(crate) fn last_end(&self) -> Option<f64> {
        self.segments.last().map(|s| s.reference.end)
    }
}

impl ManifestInfo {
    /// Check the structural invariants on which the rest of the core relies.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.periods.is_empty() {
            return Err(ManifestError::Malformed("no period".to_owned()));
        }
        for (period_idx, period) in self.periods.iter().enumerate() {
            if period.stream_sets.is_empty() {
                return Err(ManifestError::Malformed(format!(
                    "period {period_idx} has no stream set"
                )));
            }
            let mut seen_ids: HashSet<(MediaType, u32)> = HashSet::new();
            for set in &period.stream_sets {
                if set.streams.is_empty() {
                    return Err(ManifestError::Malformed(format!(
                        "{} stream set without stream in period {period_idx}",
                        set.content_type
                    )));
                }
                for stream in &set.streams {
                    if !seen_ids.insert((set.content_type, stream.id)) {
                        return Err(ManifestError::Malformed(format!(
                            "duplicate {} stream id {}",
                            set.content_type, stream.id
                        )));
                    }
                    validate_segments(stream)?;
                }
            }
        }
        Ok(())
    }

    /// Media types for which the content has at least one stream.
    pub fn content_types(&self) -> Vec<MediaType> {
        MediaType::ALL
            .into_iter()
            .filter(|t| self.stream_sets(*t).next().is_some())
            .collect()
    }

    /// Stream sets of the given type in the first period containing that type.
    pub(crate) fn stream_sets(
        &self,
        content_type: MediaType,
    ) -> impl Iterator<Item = &StreamSetInfo> {
        self.periods
            .iter()
            .find(|p| p.stream_sets.iter().any(|s| s.content_type == content_type))
            .into_iter()
            .flat_map(move |p| {
                p.stream_sets
                    .iter()
                    .filter(move |s| s.content_type == content_type)
            })
    }

    pub(crate) fn stream(&self, content_type: MediaType, id: u32) -> Option<&StreamInfo> {
        self.stream_sets(content_type)
            .flat_map(|s| s.streams.iter())
            .find(|s| s.id == id)
    }

    /// Build the `Timeline` of the track with the given id, converting period-relative
    /// times into presentation times.
    pub(crate) fn timeline(&self, content_type: MediaType, id: u32) -> Timeline {
        let mut timeline = Timeline::default();
        for period in &self.periods {
            let stream = period
                .stream_sets
                .iter()
                .filter(|s| s.content_type == content_type)
                .flat_map(|s| s.streams.iter())
                .find(|s| s.id == id);
            let Some(stream) = stream else {
                continue;
            };
            let init = stream.init_segment.as_ref().map(|init| {
                timeline.inits.push(init.clone());
                timeline.inits.len() - 1
            });
            for seg in &stream.segments {
                timeline.segments.push(TimelineSegment {
                    reference: SegmentReference {
                        start: period.start + seg.start,
                        end: period.start + seg.end,
                        ..seg.clone()
                    },
                    init,
                });
            }
        }
        timeline
    }
}

fn validate_segments(stream: &StreamInfo) -> Result<(), ManifestError> {
    let mut prev_start = f64::NEG_INFINITY;
    for seg in &stream.segments {
        if seg.end.partial_cmp(&seg.start) != Some(Ordering::Greater) {
            return Err(ManifestError::Malformed(format!(
                "segment {} of stream {} has an empty time range",
                seg.index, stream.id
            )));
        }
        if seg.start < prev_start {
            return Err(ManifestError::Malformed(format!(
                "segments of stream {} are not in chronological order",
                stream.id
            )));
        }
        prev_start = seg.start;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// `count` contiguous segments of `duration` seconds.
    pub(crate) fn make_stream(
        id: u32,
        bandwidth: f64,
        height: Option<u32>,
        count: u32,
        duration: f64,
    ) -> StreamInfo {
        StreamInfo {
            id,
            bandwidth,
            width: height.map(|h| h * 16 / 9),
            height,
            mime_type: "video/mp4".to_owned(),
            codecs: "avc1.4d401f".to_owned(),
            init_segment: Some(InitSegmentReference {
                url: format!("https://cdn.test/{id}/init.mp4"),
                byte_range: None,
            }),
            segments: (0..count)
                .map(|i| SegmentReference {
                    index: i,
                    start: f64::from(i) * duration,
                    end: f64::from(i + 1) * duration,
                    url: format!("https://cdn.test/{id}/{i}.m4s"),
                    byte_range: None,
                })
                .collect(),
        }
    }

    pub(crate) fn make_manifest(sets: Vec<StreamSetInfo>) -> ManifestInfo {
        ManifestInfo {
            url: Some("https://cdn.test/manifest.mpd".to_owned()),
            periods: vec![PeriodInfo {
                start: 0.,
                stream_sets: sets,
            }],
        }
    }

    pub(crate) fn make_set(content_type: MediaType, streams: Vec<StreamInfo>) -> StreamSetInfo {
        StreamSetInfo {
            content_type,
            language: None,
            streams,
        }
    }

    #[test]
    fn test_validate_rejects_malformed_manifests() {
        let no_period = ManifestInfo {
            url: None,
            periods: vec![],
        };
        assert!(matches!(
            no_period.validate(),
            Err(ManifestError::Malformed(_))
        ));

        let empty_set = make_manifest(vec![make_set(MediaType::Video, vec![])]);
        assert!(empty_set.validate().is_err());

        let duplicated = make_manifest(vec![make_set(
            MediaType::Video,
            vec![
                make_stream(1, 1e6, Some(720), 2, 2.),
                make_stream(1, 2e6, Some(1080), 2, 2.),
            ],
        )]);
        assert!(duplicated.validate().is_err());

        let mut unordered = make_stream(1, 1e6, Some(720), 3, 2.);
        unordered.segments.swap(0, 2);
        let unordered = make_manifest(vec![make_set(MediaType::Video, vec![unordered])]);
        assert!(unordered.validate().is_err());

        let valid = make_manifest(vec![
            make_set(MediaType::Video, vec![make_stream(1, 1e6, Some(720), 2, 2.)]),
            make_set(MediaType::Audio, vec![make_stream(1, 1e5, None, 2, 2.)]),
        ]);
        assert_eq!(valid.validate(), Ok(()));
        assert_eq!(
            valid.content_types(),
            vec![MediaType::Video, MediaType::Audio]
        );
    }

    #[test]
    fn test_timeline_spans_periods() {
        let manifest = ManifestInfo {
            url: None,
            periods: vec![
                PeriodInfo {
                    start: 0.,
                    stream_sets: vec![make_set(
                        MediaType::Video,
                        vec![make_stream(3, 1e6, Some(720), 2, 4.)],
                    )],
                },
                PeriodInfo {
                    start: 8.,
                    stream_sets: vec![make_set(
                        MediaType::Video,
                        vec![make_stream(3, 1e6, Some(720), 2, 4.)],
                    )],
                },
            ],
        };
        let timeline = manifest.timeline(MediaType::Video, 3);
        assert_eq!(timeline.inits.len(), 2);
        assert_eq!(timeline.segments.len(), 4);
        assert_eq!(timeline.segments[2].reference.start, 8.);
        assert_eq!(timeline.segments[2].init, Some(1));
        assert_eq!(timeline.last_end(), Some(16.));
        assert!(manifest.timeline(MediaType::Audio, 3).segments.is_empty());
    }
}
