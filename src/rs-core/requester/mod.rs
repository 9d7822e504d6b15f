use crate::{
    bindings::{MediaType, RequestId, TimerId},
    errors::NetworkError,
    manifest::{ByteRange, InitKey, InitSegmentReference, TimelineSegment},
    platform::Fetcher,
    Logger,
};

mod configuration;

pub use configuration::{RequestKind, RequestSettings, RequesterConfiguration};

/// The `Requester` is the module performing HTTP(s) requests through the host's `Fetcher`.
///
/// Depending on the nature of the resource and on its configuration, it also has a retry
/// mechanism based on an exponential backoff delay, to retry requesting resources without
/// overloading the server serving them.
///
/// Every request it knows about is in `pending_requests`. Removing a request from there (on
/// abort, reset...) is what makes its later completion, if any, be ignored.
pub(crate) struct Requester {
    fetcher: Box<dyn Fetcher>,

    config: RequesterConfiguration,

    /// Information on the current requests, by chronological order (from the time the request
    /// was made).
    ///
    /// There should be only one segment request per `MediaType` at the same time.
    pending_requests: Vec<PendingRequest>,

    /// Depending the nature of the failure, failed requests might be retried.
    ///
    /// To avoid overloading the server serving those resources, retried requests are
    /// actually performed after a timer.
    /// This variable allows to link here a timer's `TimerId` (which will be communicated back
    /// when the timer has elapsed) to the `RequestId` of the failed attempt.
    ///
    /// Note that retried requests stay in the `pending_requests` vector, even when the request
    /// is not really pending.
    retry_timers: Vec<(TimerId, RequestId)>,
}

/// What a request is for.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RequestPayload {
    Manifest,
    /// License request, with the id given to it by the caller.
    License(u32),
    Segment(SegmentRequestInfo),
}

impl RequestPayload {
    pub(crate) fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Manifest => RequestKind::Manifest,
            RequestPayload::License(_) => RequestKind::License,
            RequestPayload::Segment(_) => RequestKind::Segment,
        }
    }
}

/// Metadata associated with a segment request.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SegmentRequestInfo {
    pub(crate) media_type: MediaType,

    /// Track the segment belongs to.
    pub(crate) track_id: u32,

    /// Start and end of the requested segment.
    /// `None` for initialization segments, which contain no media data.
    pub(crate) time_info: Option<(f64, f64)>,

    /// For an initialization segment, the key identifying it.
    /// For a media segment, the initialization segment it depends on.
    pub(crate) init: Option<InitKey>,
}

impl SegmentRequestInfo {
    pub(crate) fn is_init(&self) -> bool {
        self.time_info.is_none()
    }
}

/// A request known by the `Requester`.
#[derive(Clone, Debug)]
pub(crate) struct PendingRequest {
    /// ID identifying the current attempt on the host-side.
    request_id: RequestId,

    pub(crate) url: String,

    pub(crate) byte_range: Option<ByteRange>,

    pub(crate) payload: RequestPayload,

    /// Number of time the request has already been attempted.
    pub(crate) attempts_failed: u32,

    /// If `true` the request is not really pending, we're currently pending for some
    /// timer to finish before retrying it.
    ///
    /// In that case, the `request_id` corresponds to the one of the previous request
    /// and should not be relied on.
    pub(crate) is_waiting_for_retry: bool,
}

pub(crate) enum RetryResult {
    /// The failed request was not known, e.g. it was aborted in the meantime.
    NotFound,
    /// The request will be retried after a delay.
    Retried,
    /// The request failed for good.
    Failed(PendingRequest, NetworkError),
}

impl Requester {
    pub(crate) fn new(fetcher: Box<dyn Fetcher>, config: RequesterConfiguration) -> Self {
        Self {
            fetcher,
            config,
            pending_requests: vec![],
            retry_timers: vec![],
        }
    }

    pub(crate) fn config_mut(&mut self) -> &mut RequesterConfiguration {
        &mut self.config
    }

    /// Abort every request and forget about them.
    pub(crate) fn reset(&mut self) {
        self.abort_all();
    }

    pub(crate) fn fetch_manifest(&mut self, url: String) -> RequestId {
        Logger::info(&format!("Req: Fetching manifest u:{url}"));
        self.start_request(url, None, RequestPayload::Manifest)
    }

    pub(crate) fn fetch_license(&mut self, url: String, license_id: u32) -> RequestId {
        Logger::info(&format!("Req: Fetching license u:{url}"));
        self.start_request(url, None, RequestPayload::License(license_id))
    }

    /// Fetch the initialization segment whose metadata is given here.
    pub(crate) fn request_init_segment(
        &mut self,
        media_type: MediaType,
        track_id: u32,
        init_key: InitKey,
        init: &InitSegmentReference,
    ) -> RequestId {
        Logger::info(&format!(
            "Req: Fetching {media_type} init segment u:{}",
            init.url
        ));
        self.start_request(
            init.url.clone(),
            init.byte_range.clone(),
            RequestPayload::Segment(SegmentRequestInfo {
                media_type,
                track_id,
                time_info: None,
                init: Some(init_key),
            }),
        )
    }

    /// Fetch the given media segment.
    pub(crate) fn request_media_segment(
        &mut self,
        media_type: MediaType,
        track_id: u32,
        segment: &TimelineSegment,
    ) -> RequestId {
        let seg = &segment.reference;
        Logger::info(&format!(
            "Req: Fetching {media_type} segment t:{} d:{}",
            seg.start,
            seg.duration()
        ));
        self.start_request(
            seg.url.clone(),
            seg.byte_range.clone(),
            RequestPayload::Segment(SegmentRequestInfo {
                media_type,
                track_id,
                time_info: Some((seg.start, seg.end)),
                init: segment.init,
            }),
        )
    }

    fn start_request(
        &mut self,
        url: String,
        byte_range: Option<ByteRange>,
        payload: RequestPayload,
    ) -> RequestId {
        let timeout = self.config.settings(payload.kind()).timeout;
        let request_id = self.fetcher.fetch(&url, byte_range.as_ref(), timeout);
        Logger::debug(&format!("Req: Request started id:{request_id}"));
        self.pending_requests.push(PendingRequest {
            request_id,
            url,
            byte_range,
            payload,
            attempts_failed: 0,
            is_waiting_for_retry: false,
        });
        request_id
    }

    pub(crate) fn has_segment_request_pending(&self, media_type: MediaType) -> bool {
        self.pending_requests.iter().any(|r| {
            matches!(&r.payload, RequestPayload::Segment(s) if s.media_type == media_type)
        })
    }

    /// To call when the request with the given id succeeded.
    ///
    /// Returns `None` if that request is not known anymore, in which case its result should
    /// be ignored.
    pub(crate) fn on_pending_request_success(
        &mut self,
        request_id: RequestId,
    ) -> Option<PendingRequest> {
        self.end_pending_request(request_id)
    }

    /// To call when the request with the given id failed.
    ///
    /// Timeouts and some HTTP statuses are considered temporary and retried after a delay,
    /// as long as the corresponding `max_retry` is not reached.
    pub(crate) fn on_pending_request_failure(
        &mut self,
        request_id: RequestId,
        has_timeouted: bool,
        status: Option<u32>,
    ) -> RetryResult {
        let Some(pos) = self
            .pending_requests
            .iter()
            .position(|r| r.request_id == request_id && !r.is_waiting_for_retry)
        else {
            Logger::info(&format!("Req: Failed request not found, id:{request_id}"));
            return RetryResult::NotFound;
        };
        let (error, retryable) = match (has_timeouted, status) {
            (true, _) => (NetworkError::Timeout, true),
            (false, Some(x)) => (
                NetworkError::HttpStatus(x),
                x == 404 || x == 412 || x >= 500,
            ),
            (false, None) => (NetworkError::Aborted, false),
        };

        let req = &mut self.pending_requests[pos];
        let settings = *self.config.settings(req.payload.kind());
        if !retryable || req.attempts_failed >= settings.max_retry {
            Logger::info(&format!(
                "Req: Cannot retry request id:{} a:{} e:{error}",
                req.request_id, req.attempts_failed
            ));
            let req = self.pending_requests.remove(pos);
            return RetryResult::Failed(req, error);
        }
        req.attempts_failed += 1;
        req.is_waiting_for_retry = true;
        let retry_delay = get_waiting_delay(
            req.attempts_failed,
            settings.backoff_base,
            settings.backoff_max,
        );
        Logger::info(&format!(
            "Req: Retrying request after timer id:{} d:{} a:{}",
            req.request_id, retry_delay, req.attempts_failed
        ));
        let old_id = req.request_id;
        let timer_id = self.fetcher.start_timer(retry_delay);
        self.retry_timers.push((timer_id, old_id));
        RetryResult::Retried
    }

    /// To call when a timer ended. Restarts the request which was waiting on it, if any.
    ///
    /// Returns `true` if that timer was one of the `Requester`'s.
    pub(crate) fn on_timer_finished(&mut self, timer_id: TimerId) -> bool {
        let Some(pos) = self.retry_timers.iter().position(|t| t.0 == timer_id) else {
            return false;
        };
        let (_, old_id) = self.retry_timers.remove(pos);
        if let Some(req) = self
            .pending_requests
            .iter_mut()
            .find(|r| r.request_id == old_id)
        {
            let timeout = self.config.settings(req.payload.kind()).timeout;
            req.is_waiting_for_retry = false;
            req.request_id = self.fetcher.fetch(&req.url, req.byte_range.as_ref(), timeout);
            Logger::debug(&format!(
                "Req: Retried request id:{} (was {old_id})",
                req.request_id
            ));
        }
        true
    }

    pub(crate) fn abort_all(&mut self) {
        for (timer_id, _) in self.retry_timers.drain(..) {
            self.fetcher.clear_timer(timer_id);
        }
        for req in self.pending_requests.drain(..) {
            if !req.is_waiting_for_retry {
                self.fetcher.abort(req.request_id);
            }
        }
    }

    /// Abort every pending segment request of the given type.
    pub(crate) fn abort_segments_with_type(&mut self, media_type: MediaType) {
        let mut i = 0;
        while i < self.pending_requests.len() {
            let is_target = matches!(
                &self.pending_requests[i].payload,
                RequestPayload::Segment(s) if s.media_type == media_type
            );
            if !is_target {
                i += 1;
                continue;
            }
            let req = self.pending_requests.remove(i);
            log_segment_abort(&req);
            if req.is_waiting_for_retry {
                let timers = &mut self.retry_timers;
                if let Some(pos) = timers.iter().position(|t| t.1 == req.request_id) {
                    let (timer_id, _) = timers.remove(pos);
                    self.fetcher.clear_timer(timer_id);
                }
            } else {
                self.fetcher.abort(req.request_id);
            }
        }
    }

    fn end_pending_request(&mut self, request_id: RequestId) -> Option<PendingRequest> {
        let pos = self
            .pending_requests
            .iter()
            .position(|r| r.request_id == request_id && !r.is_waiting_for_retry)?;
        Some(self.pending_requests.remove(pos))
    }
}

fn log_segment_abort(req: &PendingRequest) {
    Logger::lazy_info(&|| match &req.payload {
        RequestPayload::Segment(SegmentRequestInfo {
            media_type,
            time_info: Some((start, end)),
            ..
        }) => format!("Req: Aborting {media_type} segment: t: {start}, d: {}", end - start),
        RequestPayload::Segment(SegmentRequestInfo { media_type, .. }) => {
            format!("Req: Aborting {media_type} init segment")
        }
        _ => format!("Req: Aborting request id:{}", req.request_id),
    });
}

fn get_waiting_delay(retry_attempt: u32, base: f64, max: f64) -> f64 {
    let exponent = retry_attempt.saturating_sub(1).min(31);
    f64::min(base * f64::from(1u32 << exponent), max)
}
