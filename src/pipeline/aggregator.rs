//! Metric aggregator and state store.
//!
//! Folds each cycle's observations into counters that only ever grow and
//! recomputes windowed gauges for the keys the cycle touched. Counters are
//! persisted verbatim; gauges are cycle-local and rebuilt after a restart.
//!
//! The aggregator is owned by the cycle driver. Readers only ever see a
//! [`MetricsSnapshot`] cloned out after a cycle completed.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::pipeline::ledger::TraceLedger;
use crate::pipeline::processor::{Observation, TraceObservations};
use crate::storage::{StateFile, StateStore, StorageError};

/// `(url, service)` or `(source, target)`.
pub type PairKey = (String, String);

/// Cumulative request counters of one dimension key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestCounters {
    pub requests: u64,
    pub errors: u64,
    pub faults: u64,
    pub throttles: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub methods: BTreeMap<String, u64>,
    pub client_ips: BTreeMap<String, u64>,
}

impl RequestCounters {
    fn record(&mut self, obs: &Observation, failed: bool) {
        self.requests += 1;
        self.errors += u64::from(failed);
        self.faults += u64::from(obs.is_fault);
        self.throttles += u64::from(obs.is_throttled);
        if let Some(status) = obs.status_code {
            *self.status_codes.entry(status).or_default() += 1;
        }
        if let Some(method) = &obs.method {
            *self.methods.entry(method.clone()).or_default() += 1;
        }
    }
}

/// Every counter family. Persisted and restored as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterState {
    pub services: BTreeMap<String, RequestCounters>,
    pub urls: BTreeMap<String, RequestCounters>,
    #[serde(with = "pair_map")]
    pub url_services: BTreeMap<PairKey, RequestCounters>,
    #[serde(with = "pair_map")]
    pub dependencies: BTreeMap<PairKey, u64>,
    /// Completed cycles over the lifetime of the data directory.
    pub heartbeat: u64,
}

/// Latency gauges computed from one cycle's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub sum_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// `None` for an empty sample list; gauges are never derived from nothing.
    pub fn from_samples(samples: &mut [f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(f64::total_cmp);
        let sum_ms: f64 = samples.iter().sum();
        Some(Self {
            count: samples.len(),
            sum_ms,
            avg_ms: sum_ms / samples.len() as f64,
            p50_ms: nearest_rank(samples, 50),
            p90_ms: nearest_rank(samples, 90),
            p99_ms: nearest_rank(samples, 99),
        })
    }
}

/// Nearest-rank percentile of an ascending, non-empty list: the value at rank
/// `ceil(p / 100 * n)`, no interpolation.
pub fn nearest_rank(sorted: &[f64], percentile: usize) -> f64 {
    let n = sorted.len();
    let rank = (percentile * n).div_ceil(100).clamp(1, n);
    sorted[rank - 1]
}

/// Gauges of a request dimension (service, URL, URL×service).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestGauges {
    /// Cycle in which these values were last recomputed.
    pub cycle: u64,
    pub errors: u64,
    pub faults: u64,
    pub throttles: u64,
    /// Percentage of this cycle's requests that were errors.
    pub error_rate: Option<f64>,
    pub latency: Option<LatencySummary>,
}

/// Gauges of a dependency edge.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGauges {
    pub cycle: u64,
    /// `100 × errors / requests` of the target this cycle; unset without target traffic.
    pub health: Option<f64>,
    pub latency: Option<LatencySummary>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeState {
    pub services: BTreeMap<String, RequestGauges>,
    pub urls: BTreeMap<String, RequestGauges>,
    pub url_services: BTreeMap<PairKey, RequestGauges>,
    pub dependencies: BTreeMap<PairKey, DependencyGauges>,
}

/// Immutable view of the state after a completed cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Number of the last completed cycle; gauges older than this are stale.
    pub cycle: u64,
    pub counters: CounterState,
    pub gauges: GaugeState,
}

/// Bookkeeping of one `apply_cycle` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub aggregated: usize,
    /// Records whose trace id already appeared earlier in the same cycle.
    pub duplicates: usize,
    /// Records skipped because the ledger already holds their trace id.
    pub already_seen: usize,
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct CycleSamples {
    requests: u64,
    errors: u64,
    faults: u64,
    throttles: u64,
    latencies: Vec<f64>,
}

impl CycleSamples {
    fn record(&mut self, obs: &Observation, failed: bool) {
        self.requests += 1;
        self.errors += u64::from(failed);
        self.faults += u64::from(obs.is_fault);
        self.throttles += u64::from(obs.is_throttled);
        self.latencies.extend(obs.duration_ms);
    }

    fn into_gauges(mut self, cycle: u64, previous: Option<&RequestGauges>) -> RequestGauges {
        let error_rate = (self.requests > 0).then(|| 100.0 * self.errors as f64 / self.requests as f64);
        let latency = LatencySummary::from_samples(&mut self.latencies)
            .or_else(|| previous.and_then(|g| g.latency.clone()));
        RequestGauges {
            cycle,
            errors: self.errors,
            faults: self.faults,
            throttles: self.throttles,
            error_rate,
            latency,
        }
    }
}

#[derive(Debug, Default)]
struct CycleAccumulator {
    services: HashMap<String, CycleSamples>,
    urls: HashMap<String, CycleSamples>,
    url_services: HashMap<PairKey, CycleSamples>,
    dependencies: HashMap<PairKey, Vec<f64>>,
    client_ips: HashMap<String, HashMap<String, u64>>,
}

pub struct Aggregator {
    counters: CounterState,
    gauges: GaugeState,
    max_client_ips: usize,
}

impl Aggregator {
    pub fn new(max_client_ips: usize) -> Self {
        Self::with_counters(CounterState::default(), max_client_ips)
    }

    /// Resume from restored counters. Gauges start empty.
    pub fn with_counters(counters: CounterState, max_client_ips: usize) -> Self {
        Self {
            counters,
            gauges: GaugeState::default(),
            max_client_ips,
        }
    }

    /// Restore counters from the data directory, or start from zero.
    pub fn load_from(store: &StateStore, max_client_ips: usize) -> Self {
        let counters = store.load::<CounterState>(StateFile::Counters).unwrap_or_default();
        if counters.heartbeat > 0 {
            tracing::info!(
                services = counters.services.len(),
                urls = counters.urls.len(),
                dependencies = counters.dependencies.len(),
                heartbeat = counters.heartbeat,
                "Restored counter state"
            );
        }
        Self::with_counters(counters, max_client_ips)
    }

    pub fn persist_to(&self, store: &StateStore) -> Result<(), StorageError> {
        store.save(StateFile::Counters, &self.counters)
    }

    pub fn counters(&self) -> &CounterState {
        &self.counters
    }

    pub fn cycle(&self) -> u64 {
        self.counters.heartbeat
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cycle: self.counters.heartbeat,
            counters: self.counters.clone(),
            gauges: self.gauges.clone(),
        }
    }

    /// Fold one cycle's records, marking each aggregated trace in the ledger.
    ///
    /// A trace id is counted at most once per cycle and, unless `force_full`,
    /// never when the ledger already holds it.
    pub fn apply_cycle(
        &mut self,
        records: Vec<TraceObservations>,
        ledger: &mut TraceLedger,
        observed_at: u64,
        force_full: bool,
    ) -> CycleReport {
        let cycle = self.counters.heartbeat + 1;
        let mut report = CycleReport {
            cycle,
            ..CycleReport::default()
        };
        let mut seen = HashSet::with_capacity(records.len());
        let mut acc = CycleAccumulator::default();

        for record in records {
            if !seen.insert(record.trace_id.clone()) {
                report.duplicates += 1;
                continue;
            }
            if !force_full && ledger.has(&record.trace_id) {
                report.already_seen += 1;
                continue;
            }
            self.fold(&record, &mut acc);
            ledger.mark(&record.trace_id, observed_at);
            report.aggregated += 1;
        }
        report.evicted = ledger.evict(observed_at);

        self.count_client_ips(&mut acc.client_ips);
        self.recompute_gauges(acc, cycle);
        self.counters.heartbeat = cycle;

        metrics::record_traces_aggregated(report.aggregated);
        metrics::record_ledger_size(ledger.len());
        report
    }

    fn fold(&mut self, record: &TraceObservations, acc: &mut CycleAccumulator) {
        // A service error is a client error only; faults are counted apart.
        for obs in &record.services {
            self.counters.services.entry(obs.service.clone()).or_default().record(obs, obs.is_error);
            acc.services.entry(obs.service.clone()).or_default().record(obs, obs.is_error);
            if let Some(ip) = &obs.client_ip {
                *acc.client_ips
                    .entry(obs.service.clone())
                    .or_default()
                    .entry(ip.clone())
                    .or_default() += 1;
            }
        }

        // A URL error is any failed request to it, client or server side.
        let obs = &record.request;
        if let Some(url) = &obs.url {
            let failed = obs.is_error || obs.is_fault;
            self.counters.urls.entry(url.clone()).or_default().record(obs, failed);
            acc.urls.entry(url.clone()).or_default().record(obs, failed);

            let key = (url.clone(), obs.service.clone());
            self.counters.url_services.entry(key.clone()).or_default().record(obs, failed);
            acc.url_services.entry(key).or_default().record(obs, failed);
        }

        for edge in &record.edges {
            let key = (edge.source.clone(), edge.target.clone());
            *self.counters.dependencies.entry(key.clone()).or_default() += 1;
            let samples = acc.dependencies.entry(key).or_default();
            if let Some(ms) = edge.duration_ms {
                samples.push(ms);
            }
        }
    }

    /// Only the most frequent client IPs of each service are counted.
    fn count_client_ips(&mut self, per_service: &mut HashMap<String, HashMap<String, u64>>) {
        for (service, ips) in per_service.drain() {
            let mut ranked: Vec<(String, u64)> = ips.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            if ranked.len() > self.max_client_ips {
                tracing::debug!(
                    service = %service,
                    distinct = ranked.len(),
                    kept = self.max_client_ips,
                    "Client IP labels truncated"
                );
            }
            ranked.truncate(self.max_client_ips);

            let counters = self.counters.services.entry(service).or_default();
            for (ip, count) in ranked {
                *counters.client_ips.entry(ip).or_default() += count;
            }
        }
    }

    fn recompute_gauges(&mut self, acc: CycleAccumulator, cycle: u64) {
        let target_rates: HashMap<&str, Option<f64>> = acc
            .services
            .iter()
            .map(|(service, s)| {
                let rate = (s.requests > 0).then(|| 100.0 * s.errors as f64 / s.requests as f64);
                (service.as_str(), rate)
            })
            .collect();

        for (key, mut samples) in acc.dependencies {
            let health = target_rates.get(key.1.as_str()).copied().flatten();
            let latency = LatencySummary::from_samples(&mut samples).or_else(|| {
                self.gauges
                    .dependencies
                    .get(&key)
                    .and_then(|g| g.latency.clone())
            });
            self.gauges.dependencies.insert(key, DependencyGauges { cycle, health, latency });
        }

        for (service, samples) in acc.services {
            let gauges = samples.into_gauges(cycle, self.gauges.services.get(&service));
            self.gauges.services.insert(service, gauges);
        }
        for (url, samples) in acc.urls {
            let gauges = samples.into_gauges(cycle, self.gauges.urls.get(&url));
            self.gauges.urls.insert(url, gauges);
        }
        for (key, samples) in acc.url_services {
            let gauges = samples.into_gauges(cycle, self.gauges.url_services.get(&key));
            self.gauges.url_services.insert(key, gauges);
        }
    }
}

/// Maps keyed by a pair serialize as `[[a, b, value], ...]`, since JSON object
/// keys must be strings.
mod pair_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, V>(map: &BTreeMap<(String, String), V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_seq(map.iter().map(|((a, b), v)| (a, b, v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<BTreeMap<(String, String), V>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        let entries: Vec<(String, String, V)> = Vec::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|(a, b, v)| ((a, b), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processor::DependencyEdge;

    fn observation(service: &str, url: Option<&str>, duration_ms: f64) -> Observation {
        Observation {
            service: service.to_string(),
            url: url.map(str::to_string),
            method: Some("GET".to_string()),
            status_code: Some(200),
            client_ip: None,
            duration_ms: Some(duration_ms),
            is_error: false,
            is_fault: false,
            is_throttled: false,
        }
    }

    fn record(id: &str, request: Observation) -> TraceObservations {
        TraceObservations {
            trace_id: id.to_string(),
            services: vec![request.clone()],
            request,
            edges: Vec::new(),
        }
    }

    #[test]
    fn test_percentiles_are_nearest_rank() {
        let mut samples = vec![100.0, 20.0, 40.0, 10.0, 30.0];
        let summary = LatencySummary::from_samples(&mut samples).unwrap();
        assert_eq!(summary.p50_ms, 30.0);
        assert_eq!(summary.p90_ms, 100.0);
        assert_eq!(summary.p99_ms, 100.0);
        assert_eq!(summary.avg_ms, 40.0);
        assert_eq!(summary.sum_ms, 200.0);
        assert_eq!(summary.count, 5);

        assert_eq!(nearest_rank(&[7.0], 50), 7.0);
        assert!(LatencySummary::from_samples(&mut []).is_none());
    }

    #[test]
    fn test_counts_each_trace_once() {
        let mut aggregator = Aggregator::new(10);
        let mut ledger = TraceLedger::new(100, None);

        let records = vec![
            record("t1", observation("api", Some("/a"), 10.0)),
            record("t1", observation("api", Some("/a"), 10.0)),
        ];
        let report = aggregator.apply_cycle(records, &mut ledger, 1, false);
        assert_eq!(report.aggregated, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(aggregator.counters().services["api"].requests, 1);
        assert_eq!(aggregator.counters().urls["/a"].requests, 1);
        assert!(ledger.has("t1"));

        let again = aggregator.apply_cycle(vec![record("t1", observation("api", None, 10.0))], &mut ledger, 2, false);
        assert_eq!(again.already_seen, 1);
        assert_eq!(aggregator.counters().services["api"].requests, 1);

        let forced = aggregator.apply_cycle(vec![record("t1", observation("api", None, 10.0))], &mut ledger, 3, true);
        assert_eq!(forced.aggregated, 1);
        assert_eq!(aggregator.counters().services["api"].requests, 2);
    }

    #[test]
    fn test_gauges_persist_and_go_stale() {
        let mut aggregator = Aggregator::new(10);
        let mut ledger = TraceLedger::new(100, None);

        aggregator.apply_cycle(vec![record("t1", observation("api", None, 10.0))], &mut ledger, 1, false);
        aggregator.apply_cycle(vec![record("t2", observation("web", None, 30.0))], &mut ledger, 2, false);

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.cycle, 2);
        let api = &snapshot.gauges.services["api"];
        assert_eq!(api.cycle, 1);
        assert_eq!(api.latency.as_ref().unwrap().p50_ms, 10.0);
        assert_eq!(snapshot.gauges.services["web"].cycle, 2);
    }

    #[test]
    fn test_dependency_health_needs_target_traffic() {
        let mut aggregator = Aggregator::new(10);
        let mut ledger = TraceLedger::new(100, None);

        let mut failing = observation("orders", None, 5.0);
        failing.is_error = true;
        let mut front = record("t1", observation("front", None, 50.0));
        front.services.push(failing);
        front.edges = vec![
            DependencyEdge {
                source: "front".into(),
                target: "orders".into(),
                duration_ms: Some(20.0),
            },
            DependencyEdge {
                source: "front".into(),
                target: "db".into(),
                duration_ms: None,
            },
        ];
        let orders_ok = record("t2", observation("orders", None, 5.0));

        aggregator.apply_cycle(vec![front, orders_ok], &mut ledger, 1, false);

        let snapshot = aggregator.snapshot();
        let orders = &snapshot.gauges.dependencies[&("front".to_string(), "orders".to_string())];
        assert_eq!(orders.health, Some(50.0));
        assert_eq!(orders.latency.as_ref().unwrap().avg_ms, 20.0);

        let db = &snapshot.gauges.dependencies[&("front".to_string(), "db".to_string())];
        assert_eq!(db.health, None);
        assert_eq!(db.latency, None);
        assert_eq!(snapshot.counters.dependencies[&("front".to_string(), "db".to_string())], 1);
        assert_eq!(snapshot.gauges.services["orders"].error_rate, Some(50.0));
        assert_eq!(snapshot.gauges.services["front"].error_rate, Some(0.0));
    }

    #[test]
    fn test_url_errors_include_faults() {
        let mut aggregator = Aggregator::new(10);
        let mut ledger = TraceLedger::new(100, None);

        let mut fault = observation("api", Some("/pay"), 10.0);
        fault.status_code = Some(503);
        fault.is_fault = true;
        let mut client_error = observation("api", Some("/pay"), 10.0);
        client_error.status_code = Some(404);
        client_error.is_error = true;
        let records = vec![
            record("t1", fault),
            record("t2", client_error),
            record("t3", observation("api", Some("/pay"), 10.0)),
        ];
        aggregator.apply_cycle(records, &mut ledger, 1, false);

        let counters = aggregator.counters();
        assert_eq!(counters.urls["/pay"].errors, 2);
        assert_eq!(counters.urls["/pay"].faults, 1);
        assert_eq!(counters.url_services[&("/pay".to_string(), "api".to_string())].errors, 2);
        assert_eq!(counters.services["api"].errors, 1);
        assert_eq!(counters.services["api"].faults, 1);

        let snapshot = aggregator.snapshot();
        let rate = snapshot.gauges.urls["/pay"].error_rate.unwrap();
        assert!((rate - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfinished_node_counts_without_latency() {
        let mut aggregator = Aggregator::new(10);
        let mut ledger = TraceLedger::new(100, None);

        let mut front = record("t1", observation("front", None, 40.0));
        let mut pending = observation("worker", None, 0.0);
        pending.duration_ms = None;
        front.services.push(pending);
        aggregator.apply_cycle(vec![front], &mut ledger, 1, false);

        assert_eq!(aggregator.counters().services["worker"].requests, 1);
        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.gauges.services["worker"].latency, None);
        assert_eq!(snapshot.gauges.services["front"].latency.as_ref().unwrap().count, 1);
    }

    #[test]
    fn test_client_ips_limited_to_top_n() {
        let mut aggregator = Aggregator::new(2);
        let mut ledger = TraceLedger::new(100, None);

        let ips = ["10.0.0.3", "10.0.0.1", "10.0.0.1", "10.0.0.2", "10.0.0.2", "10.0.0.9"];
        let records = ips
            .iter()
            .enumerate()
            .map(|(i, ip)| {
                let mut obs = observation("api", None, 1.0);
                obs.client_ip = Some(ip.to_string());
                record(&format!("t{i}"), obs)
            })
            .collect();
        aggregator.apply_cycle(records, &mut ledger, 1, false);

        let client_ips = &aggregator.counters().services["api"].client_ips;
        assert_eq!(client_ips.len(), 2);
        assert_eq!(client_ips["10.0.0.1"], 2);
        assert_eq!(client_ips["10.0.0.2"], 2);
    }

    #[test]
    fn test_counters_survive_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let mut ledger = TraceLedger::new(100, None);

        let mut aggregator = Aggregator::new(10);
        let mut edge_record = record("t1", observation("api", Some("/a"), 10.0));
        edge_record.edges.push(DependencyEdge {
            source: "api".into(),
            target: "db".into(),
            duration_ms: Some(1.0),
        });
        aggregator.apply_cycle(vec![edge_record], &mut ledger, 1, false);
        aggregator.persist_to(&store).unwrap();

        let restored = Aggregator::load_from(&store, 10);
        assert_eq!(restored.counters(), aggregator.counters());
        assert_eq!(restored.cycle(), 1);
        assert!(restored.snapshot().gauges.services.is_empty());
    }
}
