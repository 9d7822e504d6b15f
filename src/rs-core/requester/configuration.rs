use crate::wasm_bindgen;

const DEFAULT_BACKOFF_BASE: f64 = 300.;
const DEFAULT_BACKOFF_MAX: f64 = 3000.;

/// The kind of resource a request is for, each having its own timeout and retry settings.
#[wasm_bindgen]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Manifest,
    Segment,
    License,
}

/// Retry and timeout settings for a single `RequestKind`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequestSettings {
    /// Amount of times a failed request might be retried on errors that seem temporary: `1`
    /// meaning it will be retried once, `2` twice, `0` never retried etc.
    pub max_retry: u32,

    /// Timeout, in milliseconds. If that timeout is exceeded, the corresponding request will
    /// fail.
    ///
    /// `None` to disable.
    pub timeout: Option<f64>,

    /// When a request is retried, a delay is awaited to avoid overloading the server.
    /// That delay then grows exponentially the more the request has to be retried.
    ///
    /// This is the initial delay, in milliseconds.
    pub backoff_base: f64,

    /// Maximum delay, in milliseconds, the backoff delay can grow to.
    pub backoff_max: f64,
}

/// Inner configuration on which the `Requester` relies.
/// Can be updated at any time through the `config_mut` `Requester`'s method.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RequesterConfiguration {
    pub manifest: RequestSettings,
    pub segment: RequestSettings,
    pub license: RequestSettings,
}

impl RequesterConfiguration {
    pub fn settings(&self, kind: RequestKind) -> &RequestSettings {
        match kind {
            RequestKind::Manifest => &self.manifest,
            RequestKind::Segment => &self.segment,
            RequestKind::License => &self.license,
        }
    }

    pub fn settings_mut(&mut self, kind: RequestKind) -> &mut RequestSettings {
        match kind {
            RequestKind::Manifest => &mut self.manifest,
            RequestKind::Segment => &mut self.segment,
            RequestKind::License => &mut self.license,
        }
    }
}

impl Default for RequesterConfiguration {
    fn default() -> Self {
        Self {
            manifest: RequestSettings {
                max_retry: 3,
                timeout: Some(10000.),
                backoff_base: DEFAULT_BACKOFF_BASE,
                backoff_max: DEFAULT_BACKOFF_MAX,
            },
            segment: RequestSettings {
                max_retry: 3,
                timeout: Some(30000.),
                backoff_base: DEFAULT_BACKOFF_BASE,
                backoff_max: DEFAULT_BACKOFF_MAX,
            },
            license: RequestSettings {
                max_retry: 2,
                timeout: Some(10000.),
                backoff_base: DEFAULT_BACKOFF_BASE,
                backoff_max: DEFAULT_BACKOFF_MAX,
            },
        }
    }
}
