//! Decoding of raw segment documents into typed trace records.
//!
//! The backend returns each segment as an opaque JSON document with nested
//! subsegments. This module flattens that tree into [`SegmentRef`]s and derives
//! the trace-level fields of a [`TraceSummary`].
//!
//! # Attribution rules
//! - A segment's node type is its `origin`, or `"segment"` when absent
//! - A subsegment with a `namespace` (`remote`, `aws`) is a call to another
//!   node: its node type is the namespace and its service is its own `name`
//! - A subsegment without a namespace is local work and inherits both from
//!   its parent
//! - Error, fault and throttle flags stay on the segment that reported them;
//!   the trace-level flags are the root segment's

use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

use crate::backend::types::{HttpInfo, NodeKind, SegmentRef, TraceSummary};

/// Node type used when a segment does not report an origin.
pub const DEFAULT_NODE_TYPE: &str = "segment";

/// A segment document that could not be decoded.
#[derive(Debug, Error)]
#[error("segment document {index} of trace {trace_id} is not valid JSON: {source}")]
pub struct DocumentError {
    pub trace_id: String,
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDocument {
    id: Option<String>,
    name: Option<String>,
    parent_id: Option<String>,
    start_time: Option<f64>,
    end_time: Option<f64>,
    in_progress: bool,
    origin: Option<String>,
    namespace: Option<String>,
    error: bool,
    fault: bool,
    throttle: bool,
    http: Option<RawHttp>,
    subsegments: Vec<RawDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttp {
    request: Option<RawHttpRequest>,
    response: Option<RawHttpResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttpRequest {
    method: Option<String>,
    url: Option<String>,
    client_ip: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawHttpResponse {
    status: Option<u16>,
}

impl RawHttp {
    fn to_info(&self) -> Option<HttpInfo> {
        let request = self.request.as_ref();
        let info = HttpInfo {
            method: request.and_then(|r| r.method.clone()),
            url: request.and_then(|r| r.url.clone()),
            client_ip: request.and_then(|r| r.client_ip.clone()),
            status: self.response.as_ref().and_then(|r| r.status),
        };
        (!info.is_empty()).then_some(info)
    }
}

struct ParentContext<'a> {
    id: &'a str,
    service: &'a str,
    node_type: &'a str,
}

/// Decode one trace from its raw segment documents.
///
/// `duration` is the backend's own trace duration in seconds, when it reports one.
pub fn decode_trace(
    trace_id: &str,
    duration: Option<f64>,
    documents: &[&str],
) -> Result<TraceSummary, DocumentError> {
    let mut summary = TraceSummary {
        id: trace_id.to_string(),
        ..TraceSummary::default()
    };
    let mut top_level = Vec::with_capacity(documents.len());

    for (index, document) in documents.iter().enumerate() {
        let raw: RawDocument = serde_json::from_str(document).map_err(|source| DocumentError {
            trace_id: trace_id.to_string(),
            index,
            source,
        })?;

        top_level.push(summary.segments.len());
        flatten(&raw, None, &mut summary.segments);
    }

    let known: HashSet<&str> = summary.segments.iter().map(|s| s.id.as_str()).collect();
    let root = top_level
        .iter()
        .map(|&i| &summary.segments[i])
        .filter(|s| s.parent_id.as_deref().map_or(true, |p| !known.contains(p)))
        .min_by(|a, b| {
            let a = a.start_time.unwrap_or(f64::INFINITY);
            let b = b.start_time.unwrap_or(f64::INFINITY);
            a.total_cmp(&b)
        });

    let (http, response_time) = match root {
        Some(root) => {
            summary.has_error = root.error;
            summary.has_fault = root.fault;
            summary.has_throttle = root.throttle;
            (root.http.clone(), root.duration_ms().map(|ms| ms / 1000.0))
        }
        None => (None, None),
    };

    let starts = top_level.iter().filter_map(|&i| summary.segments[i].start_time);
    let ends = top_level.iter().filter_map(|&i| summary.segments[i].end_time);
    let start = starts.fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.min(t))));
    let end = ends.fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));

    summary.start_time = start;
    summary.duration = duration.or(match (start, end) {
        (Some(s), Some(e)) if e >= s => Some(e - s),
        _ => None,
    });
    summary.http = http;
    summary.response_time = response_time;

    Ok(summary)
}

fn flatten(raw: &RawDocument, parent: Option<&ParentContext<'_>>, out: &mut Vec<SegmentRef>) {
    let own_name = raw.name.clone().unwrap_or_default();
    let (service, node_type, parent_id, kind) = match parent {
        None => (
            own_name,
            raw.origin
                .clone()
                .or_else(|| raw.namespace.clone())
                .unwrap_or_else(|| DEFAULT_NODE_TYPE.to_string()),
            raw.parent_id.clone(),
            NodeKind::Segment,
        ),
        Some(ctx) => match &raw.namespace {
            Some(namespace) => (own_name, namespace.clone(), Some(ctx.id.to_string()), NodeKind::Call),
            None => (
                ctx.service.to_string(),
                ctx.node_type.to_string(),
                Some(ctx.id.to_string()),
                NodeKind::Local,
            ),
        },
    };

    let segment = SegmentRef {
        id: raw.id.clone().unwrap_or_default(),
        parent_id,
        service,
        node_type,
        start_time: raw.start_time,
        end_time: if raw.in_progress { None } else { raw.end_time },
        kind,
        error: raw.error,
        fault: raw.fault,
        throttle: raw.throttle,
        http: raw.http.as_ref().and_then(RawHttp::to_info),
    };

    let ctx = ParentContext {
        id: &segment.id,
        service: &segment.service,
        node_type: &segment.node_type,
    };
    let mut children = Vec::new();
    for sub in &raw.subsegments {
        flatten(sub, Some(&ctx), &mut children);
    }

    out.push(segment);
    out.extend(children);
}
