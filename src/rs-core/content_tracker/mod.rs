use crate::{
    bindings::MediaType,
    manifest::{ManifestInfo, StreamInfo, StreamSetInfo, Timeline},
    Logger,
};

/// Description of a selectable track, as listed through the API.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: u32,
    pub content_type: MediaType,
    /// Bitrate in bits per second.
    pub bandwidth: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub language: Option<String>,
    pub active: bool,
    /// Only meaningful for text tracks: whether the active text track is displayed.
    pub enabled: bool,
}

/// Bounds on the video resolution tracks may have to be selected.
///
/// `None` means no bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Restrictions {
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub min_height: Option<u32>,
    pub max_height: Option<u32>,
}

impl Restrictions {
    /// Returns `true` if a stream of the given dimensions satisfies these `Restrictions`.
    ///
    /// A stream without a known dimension always satisfies the bounds on it.
    pub fn allows(&self, width: Option<u32>, height: Option<u32>) -> bool {
        fn within(val: Option<u32>, min: Option<u32>, max: Option<u32>) -> bool {
            match val {
                None => true,
                Some(val) => min.map_or(true, |m| val >= m) && max.map_or(true, |m| val <= m),
            }
        }
        within(width, self.min_width, self.max_width)
            && within(height, self.min_height, self.max_height)
    }
}

/// Stores the currently loaded content alongside the state of its tracks:
///   - which track is active for each media type,
///   - which tracks are eligible under the current `Restrictions`,
///   - whether text is displayed.
pub(crate) struct ContentTracker {
    manifest: ManifestInfo,
    curr_video_id: Option<u32>,
    curr_audio_id: Option<u32>,
    curr_text_id: Option<u32>,
    restrictions: Restrictions,
    text_enabled: bool,
}

impl ContentTracker {
    /// Create a new `ContentTracker` for an already-validated `ManifestInfo`.
    ///
    /// No track is active yet, see `set_active_track`.
    pub(crate) fn new(manifest: ManifestInfo, restrictions: Restrictions, text_enabled: bool) -> Self {
        Self {
            manifest,
            curr_video_id: None,
            curr_audio_id: None,
            curr_text_id: None,
            restrictions,
            text_enabled,
        }
    }

    pub(crate) fn manifest(&self) -> &ManifestInfo {
        &self.manifest
    }

    pub(crate) fn active_track_id(&self, media_type: MediaType) -> Option<u32> {
        match media_type {
            MediaType::Video => self.curr_video_id,
            MediaType::Audio => self.curr_audio_id,
            MediaType::Text => self.curr_text_id,
        }
    }

    fn active_slot(&mut self, media_type: MediaType) -> &mut Option<u32> {
        match media_type {
            MediaType::Video => &mut self.curr_video_id,
            MediaType::Audio => &mut self.curr_audio_id,
            MediaType::Text => &mut self.curr_text_id,
        }
    }

    fn is_eligible(&self, stream: &StreamInfo) -> bool {
        self.restrictions.allows(stream.width, stream.height)
    }

    /// Every track of the given type allowed by the current `Restrictions`.
    pub(crate) fn tracks(&self, media_type: MediaType) -> Vec<Track> {
        let active_id = self.active_track_id(media_type);
        self.manifest
            .stream_sets(media_type)
            .flat_map(|set| set.streams.iter().map(move |s| (set, s)))
            .filter(|(_, stream)| self.is_eligible(stream))
            .map(|(set, stream)| self.to_track(set, stream, active_id))
            .collect()
    }

    fn to_track(&self, set: &StreamSetInfo, stream: &StreamInfo, active_id: Option<u32>) -> Track {
        let active = active_id == Some(stream.id);
        Track {
            id: stream.id,
            content_type: set.content_type,
            bandwidth: stream.bandwidth,
            width: stream.width,
            height: stream.height,
            language: set.language.clone(),
            active,
            enabled: set.content_type == MediaType::Text && active && self.text_enabled,
        }
    }

    /// Make the track with the given `id` the active one for its media type.
    ///
    /// Returns `false` and changes nothing if no eligible track has that `id`.
    pub(crate) fn set_active_track(&mut self, media_type: MediaType, id: u32) -> bool {
        let eligible = self
            .manifest
            .stream(media_type, id)
            .is_some_and(|s| self.is_eligible(s));
        if !eligible {
            Logger::warn(&format!(
                "CT: Cannot activate {media_type} track {id}: unknown or not eligible"
            ));
            return false;
        }
        *self.active_slot(media_type) = Some(id);
        true
    }

    /// Activate the lowest-bandwidth track of the given type, eligible or not.
    ///
    /// To use when no track can satisfy the `Restrictions`.
    pub(crate) fn activate_fallback_track(&mut self, media_type: MediaType) -> Option<u32> {
        let id = self
            .manifest
            .stream_sets(media_type)
            .flat_map(|s| s.streams.iter())
            .min_by(|a, b| a.bandwidth.total_cmp(&b.bandwidth))?
            .id;
        Logger::warn(&format!(
            "CT: No {media_type} track is eligible, falling back to track {id}"
        ));
        *self.active_slot(media_type) = Some(id);
        Some(id)
    }

    /// Update the current `Restrictions`.
    ///
    /// For each media type whose active track is not eligible anymore, the highest-bandwidth
    /// eligible track becomes active. Those forced changes are returned.
    pub(crate) fn set_restrictions(&mut self, restrictions: Restrictions) -> Vec<(MediaType, u32)> {
        self.restrictions = restrictions;
        let mut forced = vec![];
        for media_type in MediaType::ALL {
            let Some(active_id) = self.active_track_id(media_type) else {
                continue;
            };
            let still_eligible = self
                .manifest
                .stream(media_type, active_id)
                .is_some_and(|s| self.is_eligible(s));
            if still_eligible {
                continue;
            }
            let best = self
                .tracks(media_type)
                .into_iter()
                .max_by(|a, b| a.bandwidth.total_cmp(&b.bandwidth));
            match best {
                Some(track) => {
                    Logger::info(&format!(
                        "CT: {media_type} track {active_id} now restricted, switching to {}",
                        track.id
                    ));
                    *self.active_slot(media_type) = Some(track.id);
                    forced.push((media_type, track.id));
                }
                None => Logger::warn(&format!(
                    "CT: No {media_type} track is eligible anymore, keeping {active_id}"
                )),
            }
        }
        forced
    }

    pub(crate) fn set_text_enabled(&mut self, enabled: bool) {
        self.text_enabled = enabled;
    }

    /// `Timeline` of the active track of the given type.
    pub(crate) fn active_timeline(&self, media_type: MediaType) -> Option<Timeline> {
        let id = self.active_track_id(media_type)?;
        Some(self.manifest.timeline(media_type, id))
    }

    /// Mime-type and codecs with which the sink of the given type should be created.
    pub(crate) fn sink_format(&self, media_type: MediaType) -> Option<(String, String)> {
        let stream = match self.active_track_id(media_type) {
            Some(id) => self.manifest.stream(media_type, id),
            None => self
                .manifest
                .stream_sets(media_type)
                .flat_map(|s| s.streams.iter())
                .next(),
        }?;
        Some((stream.mime_type.clone(), stream.codecs.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::{make_manifest, make_set, make_stream};

    fn tracker() -> ContentTracker {
        let manifest = make_manifest(vec![
            make_set(
                MediaType::Video,
                vec![
                    make_stream(1, 500_000., Some(360), 4, 2.),
                    make_stream(2, 1_500_000., Some(720), 4, 2.),
                    make_stream(3, 4_000_000., Some(1080), 4, 2.),
                ],
            ),
            make_set(MediaType::Text, vec![make_stream(7, 1_000., None, 4, 2.)]),
            make_set(MediaType::Text, vec![make_stream(8, 1_000., None, 4, 2.)]),
        ]);
        ContentTracker::new(manifest, Restrictions::default(), false)
    }

    #[test]
    fn test_restrictions_filter_and_restore() {
        let mut ct = tracker();
        assert!(ct.set_active_track(MediaType::Video, 3));
        let forced = ct.set_restrictions(Restrictions {
            max_height: Some(720),
            ..Restrictions::default()
        });
        assert_eq!(forced, vec![(MediaType::Video, 2)]);
        let ids: Vec<u32> = ct.tracks(MediaType::Video).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(!ct.set_active_track(MediaType::Video, 3));
        assert_eq!(ct.active_track_id(MediaType::Video), Some(2));

        let forced = ct.set_restrictions(Restrictions::default());
        assert!(forced.is_empty());
        assert_eq!(ct.tracks(MediaType::Video).len(), 3);
        assert!(ct.set_active_track(MediaType::Video, 3));
    }

    #[test]
    fn test_unsatisfiable_restrictions_keep_active_track() {
        let mut ct = tracker();
        assert!(ct.set_active_track(MediaType::Video, 1));
        let forced = ct.set_restrictions(Restrictions {
            max_height: Some(100),
            ..Restrictions::default()
        });
        assert!(forced.is_empty());
        assert_eq!(ct.active_track_id(MediaType::Video), Some(1));
        assert!(ct.tracks(MediaType::Video).is_empty());
    }

    #[test]
    fn test_text_enabled_is_independent_of_active() {
        let mut ct = tracker();
        assert!(ct.set_active_track(MediaType::Text, 7));
        ct.set_text_enabled(false);
        assert!(ct.set_active_track(MediaType::Text, 8));
        let tracks = ct.tracks(MediaType::Text);
        assert!(tracks.iter().all(|t| !t.enabled));
        assert!(tracks.iter().any(|t| t.id == 8 && t.active));

        ct.set_text_enabled(true);
        assert!(ct.set_active_track(MediaType::Text, 7));
        let tracks = ct.tracks(MediaType::Text);
        assert!(tracks.iter().any(|t| t.id == 7 && t.active && t.enabled));
        assert!(tracks.iter().any(|t| t.id == 8 && !t.active && !t.enabled));
    }

    #[test]
    fn test_restrictions_bounds() {
        let r = Restrictions {
            min_width: Some(640),
            max_height: Some(720),
            ..Restrictions::default()
        };
        assert!(r.allows(Some(1280), Some(720)));
        assert!(!r.allows(Some(320), Some(180)));
        assert!(!r.allows(Some(1920), Some(1080)));
        assert!(r.allows(None, None));
    }
}
