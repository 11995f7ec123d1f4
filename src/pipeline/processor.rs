//! Trace processor.
//!
//! Turns one fetched [`TraceSummary`] into the observation records the
//! aggregator folds:
//! - the request observation of the entry segment, which carries the URL
//! - one service observation per service node, each classified from the
//!   node's own status and flags
//! - one dependency edge per cross-service call
//!
//! A service node is a segment document, or a call subsegment whose callee
//! reported no document of its own (an uninstrumented resource). Local
//! subsegments are work of the enclosing service and never count as requests.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::backend::{HttpInfo, NodeKind, SegmentRef, TraceSummary};

/// A trace that lacks a field every trace must carry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedTraceError {
    #[error("trace has no id")]
    MissingTraceId,

    #[error("trace {trace_id} has a segment without an id")]
    MissingSegmentId { trace_id: String },

    #[error("segment {segment_id} of trace {trace_id} has no service name")]
    MissingService { trace_id: String, segment_id: String },

    #[error("segment {segment_id} of trace {trace_id} has invalid timing")]
    InvalidTiming { trace_id: String, segment_id: String },

    #[error("trace {trace_id} has no usable duration")]
    NoDuration { trace_id: String },
}

/// One request as seen by one service.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub service: String,
    pub url: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<u16>,
    pub client_ip: Option<String>,
    /// `None` for a node still in progress; it counts but adds no latency sample.
    pub duration_ms: Option<f64>,
    pub is_error: bool,
    pub is_fault: bool,
    pub is_throttled: bool,
}

/// `source` called `target`; `duration_ms` is the callee's latency when the
/// call had finished.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub duration_ms: Option<f64>,
}

/// Everything derived from a single trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceObservations {
    pub trace_id: String,
    /// The external request; drives the URL and URL×service dimensions.
    pub request: Observation,
    /// Per-service dimension, entry service first.
    pub services: Vec<Observation>,
    pub edges: Vec<DependencyEdge>,
}

/// Derive observations from a trace.
///
/// `Ok(None)` means the trace has no identifiable entry segment; that is
/// logged and skipped, as is expected for partially sampled traces.
pub fn process(summary: &TraceSummary) -> Result<Option<TraceObservations>, MalformedTraceError> {
    if summary.id.is_empty() {
        return Err(MalformedTraceError::MissingTraceId);
    }
    for segment in &summary.segments {
        validate_segment(&summary.id, segment)?;
    }

    let by_id: HashMap<&str, &SegmentRef> = summary.segments.iter().map(|s| (s.id.as_str(), s)).collect();

    let Some(entry) = entry_segment(&summary.segments, &by_id) else {
        tracing::warn!(trace_id = %summary.id, segments = summary.segments.len(), "Trace has no entry segment, skipping");
        return Ok(None);
    };

    let duration_ms = summary
        .response_time
        .map(|secs| secs * 1000.0)
        .or_else(|| entry.duration_ms())
        .or_else(|| summary.duration.map(|secs| secs * 1000.0))
        .filter(|ms| ms.is_finite() && *ms >= 0.0)
        .ok_or_else(|| MalformedTraceError::NoDuration {
            trace_id: summary.id.clone(),
        })?;

    let request = observe(
        &entry.service,
        summary.http.as_ref().or(entry.http.as_ref()),
        Some(duration_ms),
        (
            entry.error || summary.has_error,
            entry.fault || summary.has_fault,
            entry.throttle || summary.has_throttle,
        ),
    );

    let documented: HashSet<&str> = summary
        .segments
        .iter()
        .filter(|s| s.kind == NodeKind::Segment)
        .filter_map(|s| s.parent_id.as_deref())
        .collect();
    let mut services = vec![request.clone()];
    services.extend(
        summary
            .segments
            .iter()
            .filter(|s| s.id != entry.id)
            .filter(|s| match s.kind {
                NodeKind::Segment => true,
                NodeKind::Call => !documented.contains(s.id.as_str()),
                NodeKind::Local => false,
            })
            .map(|s| observe(&s.service, s.http.as_ref(), s.duration_ms(), (s.error, s.fault, s.throttle))),
    );

    let edges = summary
        .segments
        .iter()
        .filter_map(|child| {
            let parent = by_id.get(child.parent_id.as_deref()?)?;
            (parent.node_type != child.node_type && parent.service != child.service).then(|| DependencyEdge {
                source: parent.service.clone(),
                target: child.service.clone(),
                duration_ms: child.duration_ms(),
            })
        })
        .collect();

    Ok(Some(TraceObservations {
        trace_id: summary.id.clone(),
        request,
        services,
        edges,
    }))
}

/// Classify one request: client errors and server faults are counted
/// independently of each other.
fn observe(
    service: &str,
    http: Option<&HttpInfo>,
    duration_ms: Option<f64>,
    (error, fault, throttle): (bool, bool, bool),
) -> Observation {
    let status_code = http.and_then(|h| h.status);
    Observation {
        service: service.to_string(),
        url: http.and_then(|h| h.url.clone()).filter(|u| !u.is_empty()),
        method: http.and_then(|h| h.method.clone()).filter(|m| !m.is_empty()),
        status_code,
        client_ip: http.and_then(|h| h.client_ip.clone()).filter(|ip| !ip.is_empty()),
        duration_ms: duration_ms.filter(|ms| ms.is_finite() && *ms >= 0.0),
        is_error: error || matches!(status_code, Some(400..=499)),
        is_fault: fault || matches!(status_code, Some(500..=599)),
        is_throttled: throttle,
    }
}

fn validate_segment(trace_id: &str, segment: &SegmentRef) -> Result<(), MalformedTraceError> {
    if segment.id.is_empty() {
        return Err(MalformedTraceError::MissingSegmentId {
            trace_id: trace_id.to_string(),
        });
    }
    if segment.service.is_empty() {
        return Err(MalformedTraceError::MissingService {
            trace_id: trace_id.to_string(),
            segment_id: segment.id.clone(),
        });
    }

    let valid = match (segment.start_time, segment.end_time) {
        (Some(start), Some(end)) => start.is_finite() && end.is_finite() && end >= start,
        (Some(start), None) => start.is_finite(),
        (None, _) => false,
    };
    if !valid {
        return Err(MalformedTraceError::InvalidTiming {
            trace_id: trace_id.to_string(),
            segment_id: segment.id.clone(),
        });
    }
    Ok(())
}

/// The earliest-starting segment whose parent is not part of this trace.
fn entry_segment<'a>(segments: &'a [SegmentRef], by_id: &HashMap<&str, &SegmentRef>) -> Option<&'a SegmentRef> {
    segments
        .iter()
        .filter(|s| s.parent_id.as_deref().map_or(true, |p| !by_id.contains_key(p)))
        .fold(None, |best: Option<&SegmentRef>, s| match best {
            Some(b) if b.start_time <= s.start_time => Some(b),
            _ => Some(s),
        })
}
