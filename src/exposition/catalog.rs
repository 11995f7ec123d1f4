//! Names, types and help text of every trace-derived metric family.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricFamily {
    pub name: &'static str,
    pub kind: MetricKind,
    pub help: &'static str,
}

const fn counter(name: &'static str, help: &'static str) -> MetricFamily {
    MetricFamily {
        name,
        kind: MetricKind::Counter,
        help,
    }
}

const fn gauge(name: &'static str, help: &'static str) -> MetricFamily {
    MetricFamily {
        name,
        kind: MetricKind::Gauge,
        help,
    }
}

pub const SERVICE_REQUESTS: &str = "xray_service_requests_total";
pub const SERVICE_ERRORS: &str = "xray_service_errors_total";
pub const SERVICE_FAULTS: &str = "xray_service_faults_total";
pub const SERVICE_THROTTLES: &str = "xray_service_throttles_total";
pub const SERVICE_STATUS: &str = "xray_service_status_total";
pub const SERVICE_METHOD: &str = "xray_service_method_total";
pub const SERVICE_CLIENT_IP: &str = "xray_service_client_ip_total";
pub const SERVICE_ERRORS_COUNT: &str = "xray_service_errors_count";
pub const SERVICE_FAULTS_COUNT: &str = "xray_service_faults_count";
pub const SERVICE_THROTTLES_COUNT: &str = "xray_service_throttles_count";
pub const SERVICE_ERROR_RATE: &str = "xray_service_error_rate";
pub const SERVICE_LATENCY_AVG: &str = "xray_service_latency_avg_ms";
pub const SERVICE_LATENCY_P50: &str = "xray_service_latency_p50_ms";
pub const SERVICE_LATENCY_P90: &str = "xray_service_latency_p90_ms";
pub const SERVICE_LATENCY_P99: &str = "xray_service_latency_p99_ms";
pub const SERVICE_LATENCY_SUM: &str = "xray_service_latency_sum_ms";
pub const SERVICE_LATENCY_COUNT: &str = "xray_service_latency_count";
pub const SERVICE_STALE: &str = "xray_service_gauges_stale";

pub const URL_REQUESTS: &str = "xray_url_requests_total";
pub const URL_ERRORS: &str = "xray_url_errors_total";
pub const URL_STATUS: &str = "xray_url_status_total";
pub const URL_METHOD: &str = "xray_url_method_total";
pub const URL_ERROR_RATE: &str = "xray_url_error_rate";
pub const URL_LATENCY_AVG: &str = "xray_url_latency_avg_ms";
pub const URL_LATENCY_P50: &str = "xray_url_latency_p50_ms";
pub const URL_LATENCY_P90: &str = "xray_url_latency_p90_ms";
pub const URL_LATENCY_P99: &str = "xray_url_latency_p99_ms";
pub const URL_STALE: &str = "xray_url_gauges_stale";

pub const URL_SERVICE_REQUESTS: &str = "xray_url_service_requests_total";
pub const URL_SERVICE_ERRORS: &str = "xray_url_service_errors_total";
pub const URL_SERVICE_STATUS: &str = "xray_url_service_status_total";
pub const URL_SERVICE_METHOD: &str = "xray_url_service_method_total";
pub const URL_SERVICE_LATENCY_AVG: &str = "xray_url_service_latency_avg_ms";
pub const URL_SERVICE_LATENCY_P50: &str = "xray_url_service_latency_p50_ms";
pub const URL_SERVICE_LATENCY_P90: &str = "xray_url_service_latency_p90_ms";
pub const URL_SERVICE_LATENCY_P99: &str = "xray_url_service_latency_p99_ms";
pub const URL_SERVICE_STALE: &str = "xray_url_service_gauges_stale";

pub const DEPENDENCY_CALLS: &str = "xray_service_dependency_total";
pub const DEPENDENCY_HEALTH: &str = "xray_service_dependency_health";
pub const DEPENDENCY_LATENCY_AVG: &str = "xray_service_dependency_latency_avg_ms";
pub const DEPENDENCY_LATENCY_P50: &str = "xray_service_dependency_latency_p50_ms";
pub const DEPENDENCY_LATENCY_P90: &str = "xray_service_dependency_latency_p90_ms";
pub const DEPENDENCY_LATENCY_P99: &str = "xray_service_dependency_latency_p99_ms";
pub const DEPENDENCY_STALE: &str = "xray_service_dependency_gauges_stale";

pub const HEARTBEAT: &str = "xray_exporter_heartbeat";
pub const CYCLE: &str = "xray_exporter_cycle";

/// Every trace-derived family with its help text.
pub const CATALOG: &[MetricFamily] = &[
    counter(SERVICE_REQUESTS, "Total requests received by the service"),
    counter(SERVICE_ERRORS, "Total requests that ended in a client error"),
    counter(SERVICE_FAULTS, "Total requests that ended in a server fault"),
    counter(SERVICE_THROTTLES, "Total requests that were throttled"),
    counter(SERVICE_STATUS, "Total requests by HTTP status code"),
    counter(SERVICE_METHOD, "Total requests by HTTP method"),
    counter(SERVICE_CLIENT_IP, "Total requests by client IP (most frequent per cycle only)"),
    gauge(SERVICE_ERRORS_COUNT, "Client errors observed in the last cycle that saw the service"),
    gauge(SERVICE_FAULTS_COUNT, "Server faults observed in the last cycle that saw the service"),
    gauge(SERVICE_THROTTLES_COUNT, "Throttles observed in the last cycle that saw the service"),
    gauge(SERVICE_ERROR_RATE, "Percentage of requests that were client errors in the last cycle"),
    gauge(SERVICE_LATENCY_AVG, "Average latency in milliseconds over the last cycle"),
    gauge(SERVICE_LATENCY_P50, "50th percentile latency in milliseconds over the last cycle"),
    gauge(SERVICE_LATENCY_P90, "90th percentile latency in milliseconds over the last cycle"),
    gauge(SERVICE_LATENCY_P99, "99th percentile latency in milliseconds over the last cycle"),
    gauge(SERVICE_LATENCY_SUM, "Sum of latencies in milliseconds over the last cycle"),
    gauge(SERVICE_LATENCY_COUNT, "Number of latency samples in the last cycle"),
    gauge(SERVICE_STALE, "1 when the service gauges were not updated by the latest cycle"),
    counter(URL_REQUESTS, "Total requests to the URL"),
    counter(URL_ERRORS, "Total requests to the URL that ended in an error or a fault"),
    counter(URL_STATUS, "Total requests to the URL by HTTP status code"),
    counter(URL_METHOD, "Total requests to the URL by HTTP method"),
    gauge(URL_ERROR_RATE, "Percentage of requests to the URL that failed in the last cycle"),
    gauge(URL_LATENCY_AVG, "Average URL latency in milliseconds over the last cycle"),
    gauge(URL_LATENCY_P50, "50th percentile URL latency in milliseconds over the last cycle"),
    gauge(URL_LATENCY_P90, "90th percentile URL latency in milliseconds over the last cycle"),
    gauge(URL_LATENCY_P99, "99th percentile URL latency in milliseconds over the last cycle"),
    gauge(URL_STALE, "1 when the URL gauges were not updated by the latest cycle"),
    counter(URL_SERVICE_REQUESTS, "Total requests to URLs handled by specific services"),
    counter(URL_SERVICE_ERRORS, "Total errors and faults for URLs handled by specific services"),
    counter(URL_SERVICE_STATUS, "Total HTTP status codes for URLs handled by specific services"),
    counter(URL_SERVICE_METHOD, "Total HTTP methods for URLs handled by specific services"),
    gauge(URL_SERVICE_LATENCY_AVG, "Average latency in milliseconds per URL and service over the last cycle"),
    gauge(URL_SERVICE_LATENCY_P50, "50th percentile latency in milliseconds per URL and service"),
    gauge(URL_SERVICE_LATENCY_P90, "90th percentile latency in milliseconds per URL and service"),
    gauge(URL_SERVICE_LATENCY_P99, "99th percentile latency in milliseconds per URL and service"),
    gauge(URL_SERVICE_STALE, "1 when the URL and service gauges were not updated by the latest cycle"),
    counter(DEPENDENCY_CALLS, "Total calls between services"),
    gauge(DEPENDENCY_HEALTH, "Error percentage of the target service in the last cycle"),
    gauge(DEPENDENCY_LATENCY_AVG, "Average call latency in milliseconds over the last cycle"),
    gauge(DEPENDENCY_LATENCY_P50, "50th percentile call latency in milliseconds over the last cycle"),
    gauge(DEPENDENCY_LATENCY_P90, "90th percentile call latency in milliseconds over the last cycle"),
    gauge(DEPENDENCY_LATENCY_P99, "99th percentile call latency in milliseconds over the last cycle"),
    gauge(DEPENDENCY_STALE, "1 when the dependency gauges were not updated by the latest cycle"),
    counter(HEARTBEAT, "Completed collection cycles"),
    gauge(CYCLE, "Number of the cycle this output was published by"),
];
