//! HTTP client for an X-Ray-compatible trace query API.
//!
//! # Responsibilities
//! - List trace ids for a window (`POST /TraceSummaries`, paginated)
//! - Fetch batch detail (`POST /Traces`, paginated)
//! - Map HTTP and transport failures onto retryable / permanent errors
//!
//! Request signing is not done here; point `endpoint` at a signing proxy
//! when talking to a managed backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::document::decode_trace;
use crate::backend::types::{BackendError, BackendResult, TimeWindow, TraceSummary};
use crate::backend::TraceBackend;
use crate::config::BackendConfig;

/// Longest error body kept in a `BackendError`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TraceSummariesRequest<'a> {
    start_time: u64,
    end_time: u64,
    time_range_type: &'static str,
    sampling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TraceSummariesPage {
    #[serde(default)]
    trace_summaries: Vec<TraceIdEntry>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TraceIdEntry {
    id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct BatchGetTracesRequest<'a> {
    trace_ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BatchGetTracesPage {
    #[serde(default)]
    traces: Vec<RawTrace>,
    #[serde(default)]
    unprocessed_trace_ids: Vec<String>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTrace {
    id: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawSegment {
    document: Option<String>,
}

/// Tracing backend client speaking the X-Ray JSON API.
#[derive(Clone)]
pub struct HttpTraceBackend {
    client: reqwest::Client,
    summaries_url: Url,
    traces_url: Url,
    timeout: Duration,
}

impl HttpTraceBackend {
    /// Create a new client.
    ///
    /// Fails only on an unusable endpoint or client setup; nothing is sent yet.
    pub fn new(config: &BackendConfig, request_timeout: Duration) -> BackendResult<Self> {
        let mut base: Url = config.endpoint.parse().map_err(|e| {
            BackendError::Permanent(format!("Invalid backend endpoint '{}': {}", config.endpoint, e))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let join = |segment: &str| {
            base.join(segment)
                .map_err(|e| BackendError::Permanent(format!("Invalid backend endpoint: {}", e)))
        };
        let summaries_url = join("TraceSummaries")?;
        let traces_url = join("Traces")?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BackendError::Permanent(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(endpoint = %base, timeout = ?request_timeout, "Trace backend client initialized");

        Ok(Self {
            client,
            summaries_url,
            traces_url,
            timeout: request_timeout,
        })
    }

    async fn post<B, R>(&self, url: &Url, body: &B) -> BackendResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::Throttled);
        }
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(if status.is_client_error() {
                BackendError::Permanent(format!("HTTP {}: {}", status.as_u16(), body))
            } else {
                BackendError::Http {
                    status: status.as_u16(),
                    body,
                }
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_transport(e))?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn map_transport(&self, error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::Timeout(self.timeout.as_secs())
        } else {
            BackendError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl TraceBackend for HttpTraceBackend {
    async fn list_trace_ids(&self, window: TimeWindow) -> BackendResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let request = TraceSummariesRequest {
                start_time: window.start,
                end_time: window.end,
                time_range_type: "TraceId",
                sampling: false,
                next_token: next_token.as_deref(),
            };
            let page: TraceSummariesPage = self.post(&self.summaries_url, &request).await?;
            let page_len = page.trace_summaries.len();
            ids.extend(page.trace_summaries.into_iter().filter_map(|s| s.id));
            tracing::debug!(window = %window, page_len, total = ids.len(), "Retrieved trace summary page");

            match page.next_token {
                Some(token) if next_token.as_deref() != Some(token.as_str()) => next_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn get_trace_detail(&self, ids: &[String]) -> BackendResult<Vec<TraceSummary>> {
        let mut traces = Vec::with_capacity(ids.len());
        let mut next_token: Option<String> = None;

        loop {
            let request = BatchGetTracesRequest {
                trace_ids: ids,
                next_token: next_token.as_deref(),
            };
            let page: BatchGetTracesPage = self.post(&self.traces_url, &request).await?;

            if !page.unprocessed_trace_ids.is_empty() {
                tracing::debug!(
                    unprocessed = page.unprocessed_trace_ids.len(),
                    "Backend left trace ids unprocessed"
                );
            }

            for raw in page.traces {
                let Some(id) = raw.id else {
                    tracing::warn!("Ignoring trace without an id in batch response");
                    continue;
                };
                let documents: Vec<&str> = raw
                    .segments
                    .iter()
                    .filter_map(|s| s.document.as_deref())
                    .collect();
                match decode_trace(&id, raw.duration, &documents) {
                    Ok(summary) => traces.push(summary),
                    Err(e) => tracing::warn!(trace_id = %id, error = %e, "Skipping undecodable trace"),
                }
            }

            match page.next_token {
                Some(token) if next_token.as_deref() != Some(token.as_str()) => next_token = Some(token),
                _ => break,
            }
        }

        Ok(traces)
    }
}

impl std::fmt::Debug for HttpTraceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTraceBackend")
            .field("summaries_url", &self.summaries_url.as_str())
            .field("traces_url", &self.traces_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}
