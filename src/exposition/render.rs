//! Text exposition of a [`MetricsSnapshot`].
//!
//! Every render builds a fresh [`Registry`] from the snapshot, so the output
//! holds exactly the series the snapshot holds and nothing from earlier renders.

use std::collections::HashMap;
use std::string::FromUtf8Error;

use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use crate::exposition::catalog::*;
use crate::pipeline::aggregator::{LatencySummary, MetricsSnapshot, RequestGauges};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Error)]
pub enum ExpositionError {
    #[error("metric family {0} is not in the catalog")]
    UnknownFamily(&'static str),

    #[error(transparent)]
    Metrics(#[from] prometheus::Error),

    #[error("exposition is not valid UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Metric vectors of one render, created on first use of each family.
///
/// Label names must be passed in alphabetical order; the encoder writes them
/// sorted by name regardless.
#[derive(Default)]
struct Exposition {
    registry: Registry,
    counters: HashMap<&'static str, IntCounterVec>,
    gauges: HashMap<&'static str, GaugeVec>,
}

impl Exposition {
    fn counter(&mut self, family: &'static str, labels: &[(&str, &str)], value: u64) -> Result<(), ExpositionError> {
        if !self.counters.contains_key(family) {
            let vec = IntCounterVec::new(opts(family, MetricKind::Counter)?, &label_names(labels))?;
            self.registry.register(Box::new(vec.clone()))?;
            self.counters.insert(family, vec);
        }
        let vec = &self.counters[family];
        vec.get_metric_with_label_values(&label_values(labels))?.inc_by(value);
        Ok(())
    }

    fn gauge(&mut self, family: &'static str, labels: &[(&str, &str)], value: f64) -> Result<(), ExpositionError> {
        if !self.gauges.contains_key(family) {
            let vec = GaugeVec::new(opts(family, MetricKind::Gauge)?, &label_names(labels))?;
            self.registry.register(Box::new(vec.clone()))?;
            self.gauges.insert(family, vec);
        }
        let vec = &self.gauges[family];
        vec.get_metric_with_label_values(&label_values(labels))?.set(value);
        Ok(())
    }

    fn latency(
        &mut self,
        names: [&'static str; 4],
        labels: &[(&str, &str)],
        latency: &LatencySummary,
    ) -> Result<(), ExpositionError> {
        let [avg, p50, p90, p99] = names;
        self.gauge(avg, labels, latency.avg_ms)?;
        self.gauge(p50, labels, latency.p50_ms)?;
        self.gauge(p90, labels, latency.p90_ms)?;
        self.gauge(p99, labels, latency.p99_ms)
    }

    fn stale(
        &mut self,
        family: &'static str,
        labels: &[(&str, &str)],
        gauges_cycle: u64,
        current: u64,
    ) -> Result<(), ExpositionError> {
        self.gauge(family, labels, if gauges_cycle < current { 1.0 } else { 0.0 })
    }

    fn finish(self) -> Result<String, ExpositionError> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn opts(family: &'static str, kind: MetricKind) -> Result<Opts, ExpositionError> {
    let entry = CATALOG
        .iter()
        .find(|f| f.name == family && f.kind == kind)
        .ok_or(ExpositionError::UnknownFamily(family))?;
    Ok(Opts::new(entry.name, entry.help))
}

fn label_names<'a>(labels: &[(&'a str, &str)]) -> Vec<&'a str> {
    labels.iter().map(|(name, _)| *name).collect()
}

fn label_values<'a>(labels: &[(&str, &'a str)]) -> Vec<&'a str> {
    labels.iter().map(|(_, value)| *value).collect()
}

/// Render every non-empty family of `snapshot`, families sorted by name and
/// samples by label values.
pub fn render(snapshot: &MetricsSnapshot) -> Result<String, ExpositionError> {
    let mut out = Exposition::default();
    let cycle = snapshot.cycle;
    let counters = &snapshot.counters;
    let gauges = &snapshot.gauges;

    for (service, c) in &counters.services {
        let labels = [("service", service.as_str())];
        out.counter(SERVICE_REQUESTS, &labels, c.requests)?;
        out.counter(SERVICE_ERRORS, &labels, c.errors)?;
        out.counter(SERVICE_FAULTS, &labels, c.faults)?;
        out.counter(SERVICE_THROTTLES, &labels, c.throttles)?;
        for (status, n) in &c.status_codes {
            let status = status.to_string();
            out.counter(SERVICE_STATUS, &[("service", service.as_str()), ("status_code", status.as_str())], *n)?;
        }
        for (method, n) in &c.methods {
            out.counter(SERVICE_METHOD, &[("method", method.as_str()), ("service", service.as_str())], *n)?;
        }
        for (ip, n) in &c.client_ips {
            out.counter(SERVICE_CLIENT_IP, &[("client_ip", ip.as_str()), ("service", service.as_str())], *n)?;
        }
    }
    for (service, g) in &gauges.services {
        let labels = [("service", service.as_str())];
        out.gauge(SERVICE_ERRORS_COUNT, &labels, g.errors as f64)?;
        out.gauge(SERVICE_FAULTS_COUNT, &labels, g.faults as f64)?;
        out.gauge(SERVICE_THROTTLES_COUNT, &labels, g.throttles as f64)?;
        request_gauges(
            &mut out,
            g,
            &labels,
            Some(SERVICE_ERROR_RATE),
            [SERVICE_LATENCY_AVG, SERVICE_LATENCY_P50, SERVICE_LATENCY_P90, SERVICE_LATENCY_P99],
        )?;
        if let Some(latency) = &g.latency {
            out.gauge(SERVICE_LATENCY_SUM, &labels, latency.sum_ms)?;
            out.gauge(SERVICE_LATENCY_COUNT, &labels, latency.count as f64)?;
        }
        out.stale(SERVICE_STALE, &labels, g.cycle, cycle)?;
    }

    for (url, c) in &counters.urls {
        let labels = [("url", url.as_str())];
        out.counter(URL_REQUESTS, &labels, c.requests)?;
        out.counter(URL_ERRORS, &labels, c.errors)?;
        for (status, n) in &c.status_codes {
            let status = status.to_string();
            out.counter(URL_STATUS, &[("status_code", status.as_str()), ("url", url.as_str())], *n)?;
        }
        for (method, n) in &c.methods {
            out.counter(URL_METHOD, &[("method", method.as_str()), ("url", url.as_str())], *n)?;
        }
    }
    for (url, g) in &gauges.urls {
        let labels = [("url", url.as_str())];
        request_gauges(
            &mut out,
            g,
            &labels,
            Some(URL_ERROR_RATE),
            [URL_LATENCY_AVG, URL_LATENCY_P50, URL_LATENCY_P90, URL_LATENCY_P99],
        )?;
        out.stale(URL_STALE, &labels, g.cycle, cycle)?;
    }

    for ((url, service), c) in &counters.url_services {
        let labels = [("service", service.as_str()), ("url", url.as_str())];
        out.counter(URL_SERVICE_REQUESTS, &labels, c.requests)?;
        out.counter(URL_SERVICE_ERRORS, &labels, c.errors)?;
        for (status, n) in &c.status_codes {
            let status = status.to_string();
            out.counter(
                URL_SERVICE_STATUS,
                &[("service", service.as_str()), ("status_code", status.as_str()), ("url", url.as_str())],
                *n,
            )?;
        }
        for (method, n) in &c.methods {
            out.counter(
                URL_SERVICE_METHOD,
                &[("method", method.as_str()), ("service", service.as_str()), ("url", url.as_str())],
                *n,
            )?;
        }
    }
    for ((url, service), g) in &gauges.url_services {
        let labels = [("service", service.as_str()), ("url", url.as_str())];
        request_gauges(
            &mut out,
            g,
            &labels,
            None,
            [
                URL_SERVICE_LATENCY_AVG,
                URL_SERVICE_LATENCY_P50,
                URL_SERVICE_LATENCY_P90,
                URL_SERVICE_LATENCY_P99,
            ],
        )?;
        out.stale(URL_SERVICE_STALE, &labels, g.cycle, cycle)?;
    }

    for ((source, target), calls) in &counters.dependencies {
        out.counter(DEPENDENCY_CALLS, &[("source", source.as_str()), ("target", target.as_str())], *calls)?;
    }
    for ((source, target), g) in &gauges.dependencies {
        let labels = [("source", source.as_str()), ("target", target.as_str())];
        if let Some(health) = g.health {
            out.gauge(DEPENDENCY_HEALTH, &labels, health)?;
        }
        if let Some(latency) = &g.latency {
            out.latency(
                [
                    DEPENDENCY_LATENCY_AVG,
                    DEPENDENCY_LATENCY_P50,
                    DEPENDENCY_LATENCY_P90,
                    DEPENDENCY_LATENCY_P99,
                ],
                &labels,
                latency,
            )?;
        }
        out.stale(DEPENDENCY_STALE, &labels, g.cycle, cycle)?;
    }

    out.counter(HEARTBEAT, &[], counters.heartbeat)?;
    out.gauge(CYCLE, &[], cycle as f64)?;

    out.finish()
}

fn request_gauges(
    out: &mut Exposition,
    gauges: &RequestGauges,
    labels: &[(&str, &str)],
    error_rate: Option<&'static str>,
    latency_names: [&'static str; 4],
) -> Result<(), ExpositionError> {
    if let (Some(family), Some(rate)) = (error_rate, gauges.error_rate) {
        out.gauge(family, labels, rate)?;
    }
    if let Some(latency) = &gauges.latency {
        out.latency(latency_names, labels, latency)?;
    }
    Ok(())
}
