//! Trace records and backend error definitions.

use std::fmt;

use thiserror::Error;

/// Half-open polling window `[start, end)` in whole seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u64,
    pub end: u64,
}

impl TimeWindow {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Window length in seconds.
    pub fn len_secs(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, ts: u64) -> bool {
        ts >= self.start && ts < self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// HTTP metadata attached to a trace or a segment. Every field is optional
/// because the backend only records what the instrumented service reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpInfo {
    pub method: Option<String>,
    pub url: Option<String>,
    pub status: Option<u16>,
    pub client_ip: Option<String>,
}

impl HttpInfo {
    pub fn is_empty(&self) -> bool {
        self.method.is_none() && self.url.is_none() && self.status.is_none() && self.client_ip.is_none()
    }
}

/// Where a [`SegmentRef`] came from in the backend's document tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeKind {
    /// A top-level segment document, reported by the service itself.
    #[default]
    Segment,
    /// A namespaced subsegment: the caller's record of a call to another node.
    Call,
    /// A subsegment without a namespace: local work of the enclosing service.
    Local,
}

/// One service's portion of a trace, flattened out of the backend's nested documents.
///
/// `id`, `service` and `start_time` are required; they are kept loose here and
/// checked by the processor, which rejects the whole trace when one is missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentRef {
    /// Segment or subsegment id.
    pub id: String,
    /// Id of the enclosing or calling segment; `None` for a root.
    pub parent_id: Option<String>,
    /// Service this node is attributed to.
    pub service: String,
    /// Kind of node (`AWS::Lambda::Function`, `remote`, `aws`, ...).
    pub node_type: String,
    /// Seconds since the Unix epoch.
    pub start_time: Option<f64>,
    /// Absent while the segment is still in progress.
    pub end_time: Option<f64>,
    pub kind: NodeKind,
    /// Flags this segment reported about its own request.
    pub error: bool,
    pub fault: bool,
    pub throttle: bool,
    pub http: Option<HttpInfo>,
}

impl SegmentRef {
    /// Duration in milliseconds, if the segment has finished.
    pub fn duration_ms(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start) * 1000.0),
            _ => None,
        }
    }
}

/// A fetched trace. Immutable once fetched; only derived observations outlive a cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceSummary {
    pub id: String,
    /// Seconds since the Unix epoch.
    pub start_time: Option<f64>,
    /// Whole-trace duration in seconds.
    pub duration: Option<f64>,
    /// Entry segment duration in seconds.
    pub response_time: Option<f64>,
    /// Flags of the root segment.
    pub has_error: bool,
    pub has_fault: bool,
    pub has_throttle: bool,
    pub http: Option<HttpInfo>,
    pub segments: Vec<SegmentRef>,
}

/// Errors returned by a tracing backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend asked us to slow down.
    #[error("backend throttled the request")]
    Throttled,

    /// Request did not complete within its deadline.
    #[error("backend request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status that may succeed later.
    #[error("backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response could not be decoded.
    #[error("failed to decode backend response: {0}")]
    Decode(String),

    /// Request is wrong and will keep failing.
    #[error("permanent backend error: {0}")]
    Permanent(String),
}

impl BackendError {
    /// Anything not explicitly permanent is retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Permanent(_) | BackendError::Decode(_))
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
